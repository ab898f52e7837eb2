use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace};

use crate::{
    error::LoadPlanError,
    plan::{visit::ReturnGraphVisitationStrategy, LoadPlan, LoadPlanNode},
};

/// State of a single deep copy: the plan being copied, the plan being produced, and which
/// original node became which copy.
///
/// A copy is registered before its children are copied, so a child that leads back to an
/// ancestor, or a fetch listed by several owners, resolves to the copy already made.
pub struct CopyContext<'a> {
    source: &'a LoadPlan,
    target: LoadPlan,
    copies: FxHashMap<NodeIndex, NodeIndex>,
    strategy: &'a mut dyn ReturnGraphVisitationStrategy,
}

impl<'a> CopyContext<'a> {
    pub fn new(source: &'a LoadPlan, strategy: &'a mut dyn ReturnGraphVisitationStrategy) -> Self {
        CopyContext {
            source,
            target: LoadPlan::new(),
            copies: FxHashMap::default(),
            strategy,
        }
    }

    pub fn source(&self) -> &'a LoadPlan {
        self.source
    }

    pub fn target(&self) -> &LoadPlan {
        &self.target
    }

    pub fn strategy_mut(&mut self) -> &mut dyn ReturnGraphVisitationStrategy {
        &mut *self.strategy
    }

    pub fn copy_of(&self, original: NodeIndex) -> Option<NodeIndex> {
        self.copies.get(&original).copied()
    }

    /// Adds `node` to the target plan as the copy of `original`.
    pub fn insert_copy(&mut self, original: NodeIndex, node: LoadPlanNode) -> NodeIndex {
        let copy = self.target.add_node(node);
        trace!("copied node [{}] into [{}]", original.index(), copy.index());
        self.copies.insert(original, copy);

        copy
    }

    /// Copies the children listed by `original_owner` and lists their copies on `owner_copy`,
    /// in the original order.
    pub fn copy_fetches(
        &mut self,
        original_owner: NodeIndex,
        owner_copy: NodeIndex,
    ) -> Result<(), LoadPlanError> {
        let source = self.source;

        for child in source.fetches_of(original_owner) {
            let child_copy = match self.copy_of(child) {
                Some(copy) => copy,
                None => {
                    let child_owner = source.fetch(child)?.owner();
                    if child_owner == original_owner {
                        self.copy_fetch(child, owner_copy)?
                    } else {
                        // listed here, owned elsewhere
                        let child_owner_copy = self.ensure_copied(child_owner)?;
                        match self.copy_of(child) {
                            Some(copy) => copy,
                            None => self.copy_fetch(child, child_owner_copy)?,
                        }
                    }
                }
            };

            self.target.link_fetch(owner_copy, child_copy)?;
        }

        Ok(())
    }

    /// Copies a single fetch owned by `owner_copy`, or returns its existing copy.
    pub fn copy_fetch(
        &mut self,
        original: NodeIndex,
        owner_copy: NodeIndex,
    ) -> Result<NodeIndex, LoadPlanError> {
        if let Some(copy) = self.copy_of(original) {
            trace!("reusing copy [{}] of node [{}]", copy.index(), original.index());
            return Ok(copy);
        }

        let source = self.source;
        source.fetch(original)?.make_copy(original, self, owner_copy)
    }

    /// Makes sure `original` has a copy, copying its owner chain first when needed.
    pub fn ensure_copied(&mut self, original: NodeIndex) -> Result<NodeIndex, LoadPlanError> {
        if let Some(copy) = self.copy_of(original) {
            return Ok(copy);
        }

        let source = self.source;
        match source.node(original)? {
            LoadPlanNode::EntityReturn(entity_return) => entity_return.make_copy(original, self),
            node => {
                let owner = node
                    .as_fetch()
                    .ok_or_else(|| {
                        LoadPlanError::InvariantViolation(format!(
                            "cannot copy {} [{}]",
                            node.kind_name(),
                            original.index()
                        ))
                    })?
                    .owner();
                let owner_copy = self.ensure_copied(owner)?;

                self.copy_fetch(original, owner_copy)
            }
        }
    }

    /// Ends the copy and hands out the produced plan, with its returns in the original order.
    pub fn finish(self) -> Result<LoadPlan, LoadPlanError> {
        let CopyContext {
            source,
            mut target,
            copies,
            strategy,
        } = self;
        strategy.finish(source);

        let returns = source
            .returns()
            .iter()
            .map(|original| {
                copies.get(original).copied().ok_or(LoadPlanError::MissingNode(
                    original.index(),
                    String::from("when collecting copied returns"),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        target.set_returns(returns);

        debug!("copied load plan with {} nodes", target.node_count());

        Ok(target)
    }
}

impl LoadPlan {
    /// Deep copies the plan, notifying `strategy` around every node it copies. The copy has
    /// the same shape, including shared and circular branches, and shares no node with the
    /// original.
    #[instrument(level = "trace", skip_all, fields(nodes = self.node_count()))]
    pub fn make_copy(
        &self,
        strategy: &mut dyn ReturnGraphVisitationStrategy,
    ) -> Result<LoadPlan, LoadPlanError> {
        let mut context = CopyContext::new(self, strategy);
        context.strategy_mut().start(self);

        for root in self.returns() {
            context.ensure_copied(*root)?;
        }

        context.finish()
    }
}
