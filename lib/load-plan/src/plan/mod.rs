//! The fetch tree: an arena of plan nodes connected by "lists as child" edges.
//!
//! Roots are [`EntityReturn`]s. Every other node is a [`Fetch`] that carries a fixed
//! back-reference to the owner it was built for. Outgoing edges of an owner are ordered by
//! registration position; an owner may also list fetches owned elsewhere (shared or
//! circular structure), which is why the tree is a graph and why walking it always tracks
//! visited nodes.

pub mod builder;
pub mod collection;
pub mod composite;
pub mod copy;
pub mod display;
pub mod entity;
pub mod fetch;
pub mod path;
pub mod visit;

use std::{collections::VecDeque, sync::Arc};

use indexmap::IndexSet;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::EdgeRef,
    Direction,
};
use rustc_hash::FxHashSet;
use tracing::{instrument, trace};

use crate::{
    error::LoadPlanError,
    fragment::SqlSelectFragmentResolver,
    metadata::AttributeType,
    process::{context::ResultSetProcessingContext, instance::EntityHandle},
    row::ResultRow,
};

pub use collection::CollectionFetch;
pub use composite::CompositeFetch;
pub use entity::{EntityFetch, EntityReturn};
pub use fetch::{EntityReference, Fetch, FetchOwner};
pub use path::PropertyPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchEdge {
    pub position: usize,
}

#[derive(Debug)]
pub enum LoadPlanNode {
    EntityReturn(EntityReturn),
    EntityFetch(EntityFetch),
    CollectionFetch(CollectionFetch),
    CompositeFetch(CompositeFetch),
}

impl LoadPlanNode {
    pub fn as_fetch(&self) -> Option<&dyn Fetch> {
        match self {
            LoadPlanNode::EntityReturn(_) => None,
            LoadPlanNode::EntityFetch(fetch) => Some(fetch),
            LoadPlanNode::CollectionFetch(fetch) => Some(fetch),
            LoadPlanNode::CompositeFetch(fetch) => Some(fetch),
        }
    }

    pub fn as_fetch_owner(&self) -> Option<&dyn FetchOwner> {
        match self {
            LoadPlanNode::EntityReturn(node) => Some(node),
            LoadPlanNode::EntityFetch(node) => Some(node),
            LoadPlanNode::CompositeFetch(node) => Some(node),
            LoadPlanNode::CollectionFetch(_) => None,
        }
    }

    /// Entity returns, entity fetches and collection elements identify an entity.
    pub fn as_entity_reference(&self) -> Option<&dyn EntityReference> {
        match self {
            LoadPlanNode::EntityReturn(node) => Some(node),
            LoadPlanNode::EntityFetch(node) => Some(node),
            LoadPlanNode::CollectionFetch(node) => Some(node),
            LoadPlanNode::CompositeFetch(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LoadPlanNode::EntityReturn(_) => "EntityReturn",
            LoadPlanNode::EntityFetch(_) => "EntityFetch",
            LoadPlanNode::CollectionFetch(_) => "CollectionFetch",
            LoadPlanNode::CompositeFetch(_) => "CompositeFetch",
        }
    }

    pub fn property_path(&self) -> &PropertyPath {
        match self {
            LoadPlanNode::EntityReturn(node) => FetchOwner::property_path(node),
            LoadPlanNode::EntityFetch(node) => Fetch::property_path(node),
            LoadPlanNode::CollectionFetch(node) => Fetch::property_path(node),
            LoadPlanNode::CompositeFetch(node) => Fetch::property_path(node),
        }
    }

    /// Whether the node reads its own columns out of the row its owner is read from.
    pub fn is_joined(&self) -> bool {
        match self {
            LoadPlanNode::EntityReturn(_) => true,
            other => other
                .as_fetch()
                .is_some_and(|fetch| fetch.fetch_strategy().is_join_fetched()),
        }
    }
}

impl From<EntityFetch> for LoadPlanNode {
    fn from(node: EntityFetch) -> Self {
        LoadPlanNode::EntityFetch(node)
    }
}

impl From<CollectionFetch> for LoadPlanNode {
    fn from(node: CollectionFetch) -> Self {
        LoadPlanNode::CollectionFetch(node)
    }
}

impl From<CompositeFetch> for LoadPlanNode {
    fn from(node: CompositeFetch) -> Self {
        LoadPlanNode::CompositeFetch(node)
    }
}

/// An immutable, shareable template once built. Copies are made through
/// [`LoadPlan::make_copy`], never by cloning the arena.
#[derive(Debug, Default)]
pub struct LoadPlan {
    graph: StableDiGraph<LoadPlanNode, FetchEdge>,
    returns: Vec<NodeIndex>,
}

impl LoadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_return(&mut self, entity_return: EntityReturn) -> NodeIndex {
        let index = self
            .graph
            .add_node(LoadPlanNode::EntityReturn(entity_return));
        self.returns.push(index);

        index
    }

    /// Adds a fetch and lists it as the last child of the owner it was built for.
    pub fn add_fetch(&mut self, node: LoadPlanNode) -> Result<NodeIndex, LoadPlanError> {
        let owner = node
            .as_fetch()
            .ok_or_else(|| {
                LoadPlanError::InvariantViolation(format!(
                    "{} can only be added as a return",
                    node.kind_name()
                ))
            })?
            .owner();
        self.fetch_owner(owner)?;

        let index = self.graph.add_node(node);
        self.link_fetch(owner, index)?;

        Ok(index)
    }

    pub(crate) fn add_node(&mut self, node: LoadPlanNode) -> NodeIndex {
        self.graph.add_node(node)
    }

    pub(crate) fn set_returns(&mut self, returns: Vec<NodeIndex>) {
        self.returns = returns;
    }

    /// Lists `fetch` as a child of `owner`. The fetch keeps its own owner back-reference, so
    /// linking a fetch owned elsewhere creates a shared or circular branch.
    pub fn link_fetch(&mut self, owner: NodeIndex, fetch: NodeIndex) -> Result<(), LoadPlanError> {
        self.fetch_owner(owner)?;
        self.fetch(fetch)?;

        if self.graph.find_edge(owner, fetch).is_some() {
            return Ok(());
        }

        let position = self
            .graph
            .edges_directed(owner, Direction::Outgoing)
            .count();
        trace!(
            "linking fetch [{}] to owner [{}] at position {}",
            fetch.index(),
            owner.index(),
            position
        );
        self.graph.add_edge(owner, fetch, FetchEdge { position });

        Ok(())
    }

    pub fn returns(&self) -> &[NodeIndex] {
        &self.returns
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node(&self, index: NodeIndex) -> Result<&LoadPlanNode, LoadPlanError> {
        self.graph
            .node_weight(index)
            .ok_or(LoadPlanError::MissingNode(
                index.index(),
                String::from("when getting plan node"),
            ))
    }

    pub fn fetch(&self, index: NodeIndex) -> Result<&dyn Fetch, LoadPlanError> {
        let node = self.node(index)?;

        node.as_fetch().ok_or_else(|| {
            LoadPlanError::InvariantViolation(format!(
                "node [{}] is a {}, not a fetch",
                index.index(),
                node.kind_name()
            ))
        })
    }

    pub fn fetch_owner(&self, index: NodeIndex) -> Result<&dyn FetchOwner, LoadPlanError> {
        let node = self.node(index)?;

        node.as_fetch_owner().ok_or_else(|| {
            LoadPlanError::InvariantViolation(format!(
                "node [{}] is a {}, not a fetch owner",
                index.index(),
                node.kind_name()
            ))
        })
    }

    pub fn entity_reference(
        &self,
        index: NodeIndex,
    ) -> Result<&dyn EntityReference, LoadPlanError> {
        let node = self.node(index)?;

        node.as_entity_reference().ok_or_else(|| {
            LoadPlanError::InvariantViolation(format!(
                "node [{}] is a {}, not an entity reference",
                index.index(),
                node.kind_name()
            ))
        })
    }

    /// Children listed by `owner`, in registration order.
    pub fn fetches_of(&self, owner: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(owner, Direction::Outgoing)
            .map(|edge| (edge.weight().position, edge.target()))
            .collect();
        edges.sort_by_key(|(position, _)| *position);

        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Walks owner back-references from `fetch` up to the closest entity return or entity
    /// fetch.
    pub fn find_owner_entity_reference(
        &self,
        fetch: NodeIndex,
    ) -> Result<NodeIndex, LoadPlanError> {
        let mut current = self.fetch(fetch)?.owner();

        // owner chains are acyclic in a well formed plan; the bound catches a broken one
        for _ in 0..=self.node_count() {
            let node = self.node(current).map_err(|_| {
                LoadPlanError::MissingOwnerEntityReference(fetch.index())
            })?;

            if node.as_entity_reference().is_some() {
                return Ok(current);
            }

            current = node
                .as_fetch()
                .ok_or(LoadPlanError::MissingOwnerEntityReference(fetch.index()))?
                .owner();
        }

        Err(LoadPlanError::MissingOwnerEntityReference(fetch.index()))
    }

    /// Every node reachable from the returns, breadth first and in registration order.
    pub fn reachable_nodes(&self) -> Vec<NodeIndex> {
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        let mut order = Vec::with_capacity(self.node_count());

        for root in &self.returns {
            if seen.insert(*root) {
                queue.push_back(*root);
            }
        }

        while let Some(index) = queue.pop_front() {
            order.push(index);
            for child in self.fetches_of(index) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }

        order
    }

    /// Column expressions the plan reads, for every entity reference joined into the row.
    pub fn select_fragments(&self) -> Result<Vec<String>, LoadPlanError> {
        let mut fragments = IndexSet::new();

        for index in self.reachable_nodes() {
            let node = self.node(index)?;
            let Some(reference) = node.as_entity_reference() else {
                continue;
            };
            if !node.is_joined() {
                continue;
            }

            let persister = reference.entity_persister();
            let resolver = reference.entity_fragment_resolver();
            let alias = reference.table_alias();

            for attribute in std::iter::once(&persister.identifier).chain(&persister.attributes) {
                if matches!(attribute.attribute_type, AttributeType::Collection(_)) {
                    continue;
                }
                fragments.extend(resolver.to_sql_select_fragments(alias, attribute)?);
            }
        }

        Ok(fragments.into_iter().collect())
    }

    pub fn hydrate_node(
        &self,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<(), LoadPlanError> {
        match self.node(index)? {
            LoadPlanNode::EntityReturn(entity_return) => {
                entity_return.hydrate(self, index, row, context)
            }
            node => match node.as_fetch() {
                Some(fetch) => fetch.hydrate(self, index, row, context),
                None => Ok(()),
            },
        }
    }

    pub fn resolve_node(
        &self,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        match self.node(index)? {
            LoadPlanNode::EntityReturn(entity_return) => {
                entity_return.resolve(self, index, row, context)
            }
            node => match node.as_fetch() {
                Some(fetch) => fetch.resolve(self, index, row, context),
                None => Ok(None),
            },
        }
    }

    /// Reads a root and, through it, every fetch reachable from it. Returns the root instance,
    /// `None` when the row holds no root entity.
    #[instrument(level = "trace", skip_all, fields(root = root.index()))]
    pub fn read_return(
        &self,
        root: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        match self.node(root)? {
            LoadPlanNode::EntityReturn(entity_return) => {
                entity_return.read(self, root, row, context)
            }
            other => Err(LoadPlanError::InvariantViolation(format!(
                "node [{}] is a {}, not a return",
                root.index(),
                other.kind_name()
            ))),
        }
    }

    /// Reads `fetch` against `owner`, at most once per row for the same pair.
    pub fn read_fetch(
        &self,
        fetch: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        owner: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        if !context.register_read(fetch, owner) {
            trace!(
                "fetch [{}] already read against instance #{}",
                fetch.index(),
                owner.index()
            );
            return Ok(());
        }

        self.fetch(fetch)?.read(self, fetch, row, context, owner)
    }

    pub(crate) fn read_fetches_of(
        &self,
        owner_node: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        owner: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        for fetch in self.fetches_of(owner_node) {
            self.read_fetch(fetch, row, context, owner)?;
        }

        Ok(())
    }

    pub(crate) fn owner_resolver_and_alias(
        &self,
        fetch: NodeIndex,
    ) -> Result<(Arc<dyn SqlSelectFragmentResolver>, String), LoadPlanError> {
        let owner = self.fetch(fetch)?.owner();
        let resolver = self.fetch_owner(owner)?.to_sql_select_fragment_resolver();
        let reference = self.find_owner_entity_reference(fetch)?;
        let alias = self.entity_reference(reference)?.table_alias().to_string();

        Ok((resolver, alias))
    }
}
