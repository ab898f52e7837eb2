use std::{fmt::Debug, sync::Arc};

use petgraph::stable_graph::NodeIndex;

use crate::{
    error::LoadPlanError,
    fragment::SqlSelectFragmentResolver,
    metadata::{AttributeDefinition, AttributeType, EntityPersister},
    plan::{
        builder::LoadPlanBuildingContext, copy::CopyContext, CollectionFetch, CompositeFetch,
        EntityFetch, LoadPlan, PropertyPath,
    },
    process::{context::ResultSetProcessingContext, instance::EntityHandle},
    row::ResultRow,
    strategy::FetchStrategy,
};

/// A non-root node of the fetch tree: one attribute of its owner.
///
/// Row processing runs in three phases. `hydrate` extracts the node's own raw state,
/// `resolve` turns that state into an entity instance, and `read` writes the node's value
/// onto the instance of its owner.
pub trait Fetch: Debug + Send + Sync {
    /// The owner this fetch was built for. Fixed at construction; copies get the owner copy.
    fn owner(&self) -> NodeIndex;

    fn fetched_attribute(&self) -> &AttributeDefinition;

    fn fetch_strategy(&self) -> FetchStrategy;

    fn property_path(&self) -> &PropertyPath;

    /// Path of the fetched attribute inside the nearest entity reference's state.
    fn attribute_path(&self) -> &[String];

    fn hydrate(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<(), LoadPlanError>;

    fn resolve(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError>;

    fn read(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        owner: EntityHandle,
    ) -> Result<(), LoadPlanError>;

    /// Persister of the entity the fetched attribute is read from.
    fn retrieve_fetch_source_persister(
        &self,
        plan: &LoadPlan,
    ) -> Result<Arc<EntityPersister>, LoadPlanError> {
        plan.fetch_owner(self.owner())?
            .retrieve_fetch_source_persister(plan)
    }

    /// Copies `original` (this node) into the copy context's target plan, owned by
    /// `owner_copy`. Returns the index of the copy.
    fn make_copy(
        &self,
        original: NodeIndex,
        context: &mut CopyContext<'_>,
        owner_copy: NodeIndex,
    ) -> Result<NodeIndex, LoadPlanError>;
}

/// A node that lists child fetches: entity returns, entity fetches and composite fetches.
pub trait FetchOwner: Debug + Send + Sync {
    /// Resolver that turns this owner's attributes into column expressions.
    fn to_sql_select_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver>;

    fn retrieve_fetch_source_persister(
        &self,
        plan: &LoadPlan,
    ) -> Result<Arc<EntityPersister>, LoadPlanError>;

    fn property_path(&self) -> &PropertyPath;

    /// Where an attribute of this owner lives in the state of the nearest entity reference.
    fn attribute_path_of(&self, attribute: &AttributeDefinition) -> Vec<String>;

    fn build_entity_fetch(
        &self,
        owner: NodeIndex,
        attribute: &AttributeDefinition,
        fetch_strategy: FetchStrategy,
        context: &mut LoadPlanBuildingContext,
    ) -> Result<EntityFetch, LoadPlanError> {
        let AttributeType::Entity(association) = &attribute.attribute_type else {
            return Err(unexpected_attribute_kind(attribute, "entity"));
        };
        let persister = context.entity_persister(&association.entity_name)?;
        let alias = context.aliases_mut().generate(persister.short_name());

        Ok(EntityFetch::new(
            owner,
            attribute.clone(),
            fetch_strategy,
            persister,
            alias,
            self.property_path().append(&attribute.name),
            self.attribute_path_of(attribute),
        ))
    }

    fn build_composite_fetch(
        &self,
        owner: NodeIndex,
        attribute: &AttributeDefinition,
        _context: &mut LoadPlanBuildingContext,
    ) -> Result<CompositeFetch, LoadPlanError> {
        CompositeFetch::new(
            owner,
            attribute.clone(),
            self.to_sql_select_fragment_resolver(),
            self.property_path().append(&attribute.name),
            self.attribute_path_of(attribute),
        )
    }

    fn build_collection_fetch(
        &self,
        owner: NodeIndex,
        attribute: &AttributeDefinition,
        fetch_strategy: FetchStrategy,
        context: &mut LoadPlanBuildingContext,
    ) -> Result<CollectionFetch, LoadPlanError> {
        let AttributeType::Collection(collection) = &attribute.attribute_type else {
            return Err(unexpected_attribute_kind(attribute, "collection"));
        };
        let element_persister = context.entity_persister(&collection.element_entity)?;
        let element_alias = context
            .aliases_mut()
            .generate(element_persister.short_name());

        Ok(CollectionFetch::new(
            owner,
            attribute.clone(),
            fetch_strategy,
            element_persister,
            element_alias,
            self.property_path().append(&attribute.name),
            self.attribute_path_of(attribute),
        ))
    }
}

/// An owner that identifies an entity: the place an [`crate::value::EntityKey`] is
/// hydrated and resolved.
pub trait EntityReference: Debug + Send + Sync {
    fn entity_persister(&self) -> &Arc<EntityPersister>;

    fn table_alias(&self) -> &str;

    fn entity_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver>;
}

pub(crate) fn unexpected_attribute_kind(
    attribute: &AttributeDefinition,
    expected: &str,
) -> LoadPlanError {
    LoadPlanError::InvariantViolation(format!(
        "attribute '{}' is a {} attribute, expected {}",
        attribute.name,
        attribute.attribute_type.kind_name(),
        expected
    ))
}
