use std::sync::Arc;

use petgraph::stable_graph::NodeIndex;

use crate::{
    error::LoadPlanError,
    fragment::{EntityPersisterFragmentResolver, SqlSelectFragmentResolver},
    metadata::{AttributeDefinition, EntityPersister},
    plan::{
        copy::CopyContext,
        entity::{hydrate_entity_reference, resolve_entity_reference},
        fetch::{EntityReference, Fetch},
        LoadPlan, LoadPlanNode, PropertyPath,
    },
    process::{context::ResultSetProcessingContext, instance::EntityHandle},
    row::ResultRow,
    strategy::FetchStrategy,
};

/// A to-many association. When joined, every row carries at most one element, identified
/// through the element entity reference this node stands for.
#[derive(Debug, Clone)]
pub struct CollectionFetch {
    owner: NodeIndex,
    attribute: AttributeDefinition,
    fetch_strategy: FetchStrategy,
    element_persister: Arc<EntityPersister>,
    element_alias: String,
    element_resolver: Arc<dyn SqlSelectFragmentResolver>,
    property_path: PropertyPath,
    attribute_path: Vec<String>,
}

impl CollectionFetch {
    pub fn new(
        owner: NodeIndex,
        attribute: AttributeDefinition,
        fetch_strategy: FetchStrategy,
        element_persister: Arc<EntityPersister>,
        element_alias: impl Into<String>,
        property_path: PropertyPath,
        attribute_path: Vec<String>,
    ) -> Self {
        CollectionFetch {
            owner,
            attribute,
            fetch_strategy,
            element_resolver: Arc::new(EntityPersisterFragmentResolver::new(
                element_persister.clone(),
            )),
            element_persister,
            element_alias: element_alias.into(),
            property_path,
            attribute_path,
        }
    }
}

impl Fetch for CollectionFetch {
    fn owner(&self) -> NodeIndex {
        self.owner
    }

    fn fetched_attribute(&self) -> &AttributeDefinition {
        &self.attribute
    }

    fn fetch_strategy(&self) -> FetchStrategy {
        self.fetch_strategy
    }

    fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    fn attribute_path(&self) -> &[String] {
        &self.attribute_path
    }

    fn hydrate(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<(), LoadPlanError> {
        if !self.fetch_strategy.is_join_fetched() {
            return Ok(());
        }

        hydrate_entity_reference(plan, index, row, context)
    }

    fn resolve(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        _row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        if !self.fetch_strategy.is_join_fetched() {
            return Ok(None);
        }

        resolve_entity_reference(plan, index, context)
    }

    fn read(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        _row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        owner: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        // unjoined collections stay unfetched
        if !self.fetch_strategy.is_join_fetched() {
            return Ok(());
        }

        let element = resolve_entity_reference(plan, index, context)?;
        let owner_instance = context.entity_mut(owner)?;
        owner_instance.init_collection(&self.attribute_path)?;

        match element {
            Some(element) => owner_instance.add_collection_element(&self.attribute_path, element),
            None => Ok(()),
        }
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
            .starting_collection_fetch(source, original);

        let copy = context.insert_copy(
            original,
            LoadPlanNode::CollectionFetch(CollectionFetch {
                owner: owner_copy,
                ..self.clone()
            }),
        );

        context
            .strategy_mut()
            .finishing_collection_fetch(source, original);

        Ok(copy)
    }
}

impl EntityReference for CollectionFetch {
    fn entity_persister(&self) -> &Arc<EntityPersister> {
        &self.element_persister
    }

    fn table_alias(&self) -> &str {
        &self.element_alias
    }

    fn entity_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.element_resolver.clone()
    }
}
