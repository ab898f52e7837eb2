use std::sync::Arc;

use petgraph::stable_graph::NodeIndex;
use tracing::{instrument, trace};

use crate::{
    error::LoadPlanError,
    fragment::{
        CompositeBasedSqlSelectFragmentResolver, OwnerAttributeFragments,
        SqlSelectFragmentResolver,
    },
    metadata::{AttributeDefinition, AttributeType, CompositeType, EntityPersister},
    plan::{
        copy::CopyContext,
        fetch::{unexpected_attribute_kind, Fetch, FetchOwner},
        LoadPlan, LoadPlanNode, PropertyPath,
    },
    process::{context::ResultSetProcessingContext, instance::EntityHandle},
    row::ResultRow,
    strategy::FetchStrategy,
};

/// A composite (embedded) attribute. It is a fetch of its owner and the owner of fetches
/// for its own sub-attributes, but never an entity reference: its columns belong to the
/// nearest enclosing entity, which is also the instance its children are read against.
#[derive(Debug, Clone)]
pub struct CompositeFetch {
    owner: NodeIndex,
    attribute: AttributeDefinition,
    resolver: Arc<CompositeBasedSqlSelectFragmentResolver>,
    property_path: PropertyPath,
    attribute_path: Vec<String>,
}

impl CompositeFetch {
    /// Composites are always loaded together with their owner.
    pub const FETCH_PLAN: FetchStrategy = FetchStrategy::IMMEDIATE_JOIN;

    /// Builds the composite's resolver once, from the owner's resolver applied to
    /// `attribute`. Copies share it.
    pub fn new(
        owner: NodeIndex,
        attribute: AttributeDefinition,
        owner_resolver: Arc<dyn SqlSelectFragmentResolver>,
        property_path: PropertyPath,
        attribute_path: Vec<String>,
    ) -> Result<Self, LoadPlanError> {
        let AttributeType::Composite(composite_type) = &attribute.attribute_type else {
            return Err(unexpected_attribute_kind(&attribute, "composite"));
        };

        let resolver = CompositeBasedSqlSelectFragmentResolver::new(
            composite_type.clone(),
            OwnerAttributeFragments::new(owner_resolver, attribute.clone()),
        );

        Ok(CompositeFetch {
            owner,
            attribute,
            resolver: Arc::new(resolver),
            property_path,
            attribute_path,
        })
    }

    pub fn composite_type(&self) -> &CompositeType {
        self.resolver.composite_type()
    }

    /// The concrete resolver, shared between a composite and its copies.
    pub fn composite_resolver(&self) -> &Arc<CompositeBasedSqlSelectFragmentResolver> {
        &self.resolver
    }
}

impl Fetch for CompositeFetch {
    fn owner(&self) -> NodeIndex {
        self.owner
    }

    fn fetched_attribute(&self) -> &AttributeDefinition {
        &self.attribute
    }

    fn fetch_strategy(&self) -> FetchStrategy {
        Self::FETCH_PLAN
    }

    fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    fn attribute_path(&self) -> &[String] {
        &self.attribute_path
    }

    fn hydrate(
        &self,
        _plan: &LoadPlan,
        _index: NodeIndex,
        _row: &dyn ResultRow,
        _context: &mut ResultSetProcessingContext,
    ) -> Result<(), LoadPlanError> {
        // the owning entity reference hydrates composite columns
        Ok(())
    }

    fn resolve(
        &self,
        _plan: &LoadPlan,
        _index: NodeIndex,
        _row: &dyn ResultRow,
        _context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        Ok(None)
    }

    /// Reads every child, in registration order, against the instance of the nearest entity
    /// reference rather than against `_owner`.
    #[instrument(level = "trace", skip_all, fields(composite = %self.property_path))]
    fn read(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        _owner: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        let entity_reference = plan.find_owner_entity_reference(index)?;
        let entity_key = context
            .get_processing_state(entity_reference)?
            .entity_key()
            .cloned()
            .ok_or_else(|| {
                LoadPlanError::InvariantViolation(format!(
                    "entity reference [{}] has no key while reading {}",
                    entity_reference.index(),
                    self.property_path
                ))
            })?;
        let entity = context.resolve_entity_key(&entity_key, entity_reference)?;
        trace!("reading composite children against {}", entity_key);

        for fetch in plan.fetches_of(index) {
            plan.read_fetch(fetch, row, context, entity)?;
        }

        Ok(())
    }

    fn make_copy(
        &self,
        original: NodeIndex,
        context: &mut CopyContext<'_>,
        owner_copy: NodeIndex,
    ) -> Result<NodeIndex, LoadPlanError> {
        let source = context.source();
        context
            .strategy_mut()
            .starting_composite_fetch(source, original);

        let copy = context.insert_copy(
            original,
            LoadPlanNode::CompositeFetch(CompositeFetch {
                owner: owner_copy,
                attribute: self.attribute.clone(),
                resolver: Arc::clone(&self.resolver),
                property_path: self.property_path.clone(),
                attribute_path: self.attribute_path.clone(),
            }),
        );
        context.copy_fetches(original, copy)?;

        context
            .strategy_mut()
            .finishing_composite_fetch(source, original);

        Ok(copy)
    }
}

impl FetchOwner for CompositeFetch {
    fn to_sql_select_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.resolver.clone()
    }

    fn retrieve_fetch_source_persister(
        &self,
        plan: &LoadPlan,
    ) -> Result<Arc<EntityPersister>, LoadPlanError> {
        Fetch::retrieve_fetch_source_persister(self, plan)
    }

    fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    fn attribute_path_of(&self, attribute: &AttributeDefinition) -> Vec<String> {
        let mut path = self.attribute_path.clone();
        path.push(attribute.name.clone());

        path
    }
}
