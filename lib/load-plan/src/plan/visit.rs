use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashSet;

use crate::{
    error::LoadPlanError,
    plan::{LoadPlan, LoadPlanNode},
};

/// Observer notified while a plan is walked or copied. Every callback receives the plan
/// being walked (the original, during a copy) and the node index in it. "starting" fires
/// before a node's children are processed, "finishing" after.
pub trait ReturnGraphVisitationStrategy {
    fn start(&mut self, _plan: &LoadPlan) {}

    fn finish(&mut self, _plan: &LoadPlan) {}

    fn starting_root_return(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn finishing_root_return(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn starting_entity_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn finishing_entity_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn starting_collection_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn finishing_collection_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn starting_composite_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}

    fn finishing_composite_fetch(&mut self, _plan: &LoadPlan, _index: NodeIndex) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisitationStrategy;

impl ReturnGraphVisitationStrategy for NoopVisitationStrategy {}

impl LoadPlan {
    /// Walks every node reachable from the returns once, depth first, in registration order.
    pub fn visit(
        &self,
        strategy: &mut dyn ReturnGraphVisitationStrategy,
    ) -> Result<(), LoadPlanError> {
        let mut visited = FxHashSet::default();

        strategy.start(self);
        for root in self.returns() {
            self.visit_node(*root, strategy, &mut visited)?;
        }
        strategy.finish(self);

        Ok(())
    }

    fn visit_node(
        &self,
        index: NodeIndex,
        strategy: &mut dyn ReturnGraphVisitationStrategy,
        visited: &mut FxHashSet<NodeIndex>,
    ) -> Result<(), LoadPlanError> {
        if !visited.insert(index) {
            return Ok(());
        }

        let node = self.node(index)?;
        match node {
            LoadPlanNode::EntityReturn(_) => strategy.starting_root_return(self, index),
            LoadPlanNode::EntityFetch(_) => strategy.starting_entity_fetch(self, index),
            LoadPlanNode::CollectionFetch(_) => strategy.starting_collection_fetch(self, index),
            LoadPlanNode::CompositeFetch(_) => strategy.starting_composite_fetch(self, index),
        }

        for child in self.fetches_of(index) {
            self.visit_node(child, strategy, visited)?;
        }

        match node {
            LoadPlanNode::EntityReturn(_) => strategy.finishing_root_return(self, index),
            LoadPlanNode::EntityFetch(_) => strategy.finishing_entity_fetch(self, index),
            LoadPlanNode::CollectionFetch(_) => strategy.finishing_collection_fetch(self, index),
            LoadPlanNode::CompositeFetch(_) => strategy.finishing_composite_fetch(self, index),
        }

        Ok(())
    }
}
