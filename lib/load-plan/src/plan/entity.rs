use std::{slice::Iter, sync::Arc};

use petgraph::stable_graph::NodeIndex;
use tracing::trace;

use crate::{
    error::LoadPlanError,
    fragment::{EntityPersisterFragmentResolver, FragmentResolutionError, SqlSelectFragmentResolver},
    metadata::{AttributeDefinition, AttributeType, EntityPersister},
    plan::{
        copy::CopyContext,
        fetch::{EntityReference, Fetch, FetchOwner},
        LoadPlan, LoadPlanNode, PropertyPath,
    },
    process::{
        context::ResultSetProcessingContext,
        instance::{AttributeState, AttributeValue, EntityHandle},
    },
    row::ResultRow,
    strategy::FetchStrategy,
    value::EntityKey,
};

/// Root of a load plan: the entity the query returns.
#[derive(Debug, Clone)]
pub struct EntityReturn {
    persister: Arc<EntityPersister>,
    table_alias: String,
    resolver: Arc<dyn SqlSelectFragmentResolver>,
    property_path: PropertyPath,
}

impl EntityReturn {
    pub fn new(persister: Arc<EntityPersister>, table_alias: impl Into<String>) -> Self {
        EntityReturn {
            resolver: Arc::new(EntityPersisterFragmentResolver::new(persister.clone())),
            property_path: PropertyPath::root(&persister.entity_name),
            persister,
            table_alias: table_alias.into(),
        }
    }

    pub fn hydrate(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<(), LoadPlanError> {
        hydrate_entity_reference(plan, index, row, context)
    }

    pub fn resolve(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        _row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        resolve_entity_reference(plan, index, context)
    }

    pub fn read(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
    ) -> Result<Option<EntityHandle>, LoadPlanError> {
        let Some(instance) = resolve_entity_reference(plan, index, context)? else {
            return Ok(None);
        };
        plan.read_fetches_of(index, row, context, instance)?;

        Ok(Some(instance))
    }

    pub fn make_copy(
        &self,
        original: NodeIndex,
        context: &mut CopyContext<'_>,
    ) -> Result<NodeIndex, LoadPlanError> {
        let source = context.source();
        context
            .strategy_mut()
            .starting_root_return(source, original);

        let copy = context.insert_copy(original, LoadPlanNode::EntityReturn(self.clone()));
        context.copy_fetches(original, copy)?;

        context
            .strategy_mut()
            .finishing_root_return(source, original);

        Ok(copy)
    }
}

impl FetchOwner for EntityReturn {
    fn to_sql_select_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.resolver.clone()
    }

    fn retrieve_fetch_source_persister(
        &self,
        _plan: &LoadPlan,
    ) -> Result<Arc<EntityPersister>, LoadPlanError> {
        Ok(self.persister.clone())
    }

    fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    fn attribute_path_of(&self, attribute: &AttributeDefinition) -> Vec<String> {
        vec![attribute.name.clone()]
    }
}

impl EntityReference for EntityReturn {
    fn entity_persister(&self) -> &Arc<EntityPersister> {
        &self.persister
    }

    fn table_alias(&self) -> &str {
        &self.table_alias
    }

    fn entity_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.resolver.clone()
    }
}

/// A to-one association. Joined fetches are entity references of their own and own the
/// fetches of the associated entity; other fetches only record the foreign key.
#[derive(Debug, Clone)]
pub struct EntityFetch {
    owner: NodeIndex,
    attribute: AttributeDefinition,
    fetch_strategy: FetchStrategy,
    persister: Arc<EntityPersister>,
    table_alias: String,
    resolver: Arc<dyn SqlSelectFragmentResolver>,
    property_path: PropertyPath,
    attribute_path: Vec<String>,
}

impl EntityFetch {
    pub fn new(
        owner: NodeIndex,
        attribute: AttributeDefinition,
        fetch_strategy: FetchStrategy,
        persister: Arc<EntityPersister>,
        table_alias: impl Into<String>,
        property_path: PropertyPath,
        attribute_path: Vec<String>,
    ) -> Self {
        EntityFetch {
            owner,
            attribute,
            fetch_strategy,
            resolver: Arc::new(EntityPersisterFragmentResolver::new(persister.clone())),
            persister,
            table_alias: table_alias.into(),
            property_path,
            attribute_path,
        }
    }

    fn read_foreign_key(
        &self,
        plan: &LoadPlan,
        index: NodeIndex,
        row: &dyn ResultRow,
    ) -> Result<AttributeValue, LoadPlanError> {
        let (owner_resolver, alias) = plan.owner_resolver_and_alias(index)?;
        let columns = owner_resolver.to_sql_select_fragments(&alias, &self.attribute)?;

        let [column] = columns.as_slice() else {
            return Err(FragmentResolutionError::ColumnSpanMismatch {
                owner: self.attribute.name.clone(),
                expected: 1,
                found: columns.len(),
            }
            .into());
        };

        let identifier_type = self.persister.identifier_type()?;
        let foreign_key = row.typed_value(column, identifier_type.sql_type)?;

        if foreign_key.is_null() {
            return Ok(AttributeValue::Null);
        }

        Ok(AttributeValue::Reference(EntityKey::new(
            self.persister.entity_name.clone(),
            foreign_key,
        )))
    }
}

impl Fetch for EntityFetch {
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
        row: &dyn ResultRow,
        context: &mut ResultSetProcessingContext,
        owner: EntityHandle,
    ) -> Result<(), LoadPlanError> {
        if !self.fetch_strategy.is_join_fetched() {
            let value = self.read_foreign_key(plan, index, row)?;
            return context
                .entity_mut(owner)?
                .set_attribute(&self.attribute_path, value);
        }

        let instance = resolve_entity_reference(plan, index, context)?;
        let value = instance.map_or(AttributeValue::Null, AttributeValue::Entity);
        context
            .entity_mut(owner)?
            .set_attribute(&self.attribute_path, value)?;

        match instance {
            Some(instance) => plan.read_fetches_of(index, row, context, instance),
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
            .starting_entity_fetch(source, original);

        let copy = context.insert_copy(
            original,
            LoadPlanNode::EntityFetch(EntityFetch {
                owner: owner_copy,
                ..self.clone()
            }),
        );
        context.copy_fetches(original, copy)?;

        context
            .strategy_mut()
            .finishing_entity_fetch(source, original);

        Ok(copy)
    }
}

impl FetchOwner for EntityFetch {
    fn to_sql_select_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.resolver.clone()
    }

    fn retrieve_fetch_source_persister(
        &self,
        _plan: &LoadPlan,
    ) -> Result<Arc<EntityPersister>, LoadPlanError> {
        Ok(self.persister.clone())
    }

    fn property_path(&self) -> &PropertyPath {
        &self.property_path
    }

    fn attribute_path_of(&self, attribute: &AttributeDefinition) -> Vec<String> {
        vec![attribute.name.clone()]
    }
}

impl EntityReference for EntityFetch {
    fn entity_persister(&self) -> &Arc<EntityPersister> {
        &self.persister
    }

    fn table_alias(&self) -> &str {
        &self.table_alias
    }

    fn entity_fragment_resolver(&self) -> Arc<dyn SqlSelectFragmentResolver> {
        self.resolver.clone()
    }
}

/// Reads the identifier and the basic and composite state of an entity reference into its
/// processing state. A `NULL` identifier means the row holds no such entity.
pub(crate) fn hydrate_entity_reference(
    plan: &LoadPlan,
    index: NodeIndex,
    row: &dyn ResultRow,
    context: &mut ResultSetProcessingContext,
) -> Result<(), LoadPlanError> {
    let reference = plan.entity_reference(index)?;
    let persister = reference.entity_persister();
    let resolver = reference.entity_fragment_resolver();
    let alias = reference.table_alias();

    let identifier_type = persister.identifier_type()?;
    let identifier_columns = resolver.to_sql_select_fragments(alias, &persister.identifier)?;
    let mut columns = identifier_columns.iter();
    let Some(identifier_column) = columns.next() else {
        return Err(LoadPlanError::InvalidIdentifier(persister.entity_name.clone()));
    };
    let identifier = row.typed_value(identifier_column, identifier_type.sql_type)?;

    if identifier.is_null() {
        trace!("no {} in row for reference [{}]", persister.entity_name, index.index());
        context
            .get_processing_state_mut(index)?
            .register_hydrated(None, None);
        return Ok(());
    }

    let mut state = AttributeState::new();
    for attribute in &persister.attributes {
        if !matches!(
            attribute.attribute_type,
            AttributeType::Basic(_) | AttributeType::Composite(_)
        ) {
            continue;
        }

        let columns = resolver.to_sql_select_fragments(alias, attribute)?;
        let value = read_attribute_value(row, attribute, &mut columns.iter())?;
        state.insert(attribute.name.clone(), value);
    }

    let key = EntityKey::new(persister.entity_name.clone(), identifier);
    trace!("hydrated {} for reference [{}]", key, index.index());
    context
        .get_processing_state_mut(index)?
        .register_hydrated(Some(key), Some(state));

    Ok(())
}

/// Resolves the key hydrated for an entity reference into an instance, once per row.
pub(crate) fn resolve_entity_reference(
    plan: &LoadPlan,
    index: NodeIndex,
    context: &mut ResultSetProcessingContext,
) -> Result<Option<EntityHandle>, LoadPlanError> {
    plan.entity_reference(index)?;

    let state = context.get_processing_state(index)?;
    if let Some(instance) = state.entity_instance() {
        return Ok(Some(instance));
    }
    let Some(key) = state.entity_key().cloned() else {
        return Ok(None);
    };

    let instance = context.resolve_entity_key(&key, index)?;
    context
        .get_processing_state_mut(index)?
        .register_instance(instance);

    Ok(Some(instance))
}

fn read_attribute_value(
    row: &dyn ResultRow,
    attribute: &AttributeDefinition,
    columns: &mut Iter<'_, String>,
) -> Result<AttributeValue, LoadPlanError> {
    match &attribute.attribute_type {
        AttributeType::Basic(basic) => {
            let column = columns.next().ok_or_else(|| {
                LoadPlanError::InvariantViolation(format!(
                    "no column left for attribute '{}'",
                    attribute.name
                ))
            })?;

            Ok(row.typed_value(column, basic.sql_type)?.into())
        }
        AttributeType::Composite(composite) => {
            let mut state = AttributeState::new();
            for sub_attribute in &composite.attributes {
                match &sub_attribute.attribute_type {
                    AttributeType::Basic(_) | AttributeType::Composite(_) => {
                        let value = read_attribute_value(row, sub_attribute, columns)?;
                        state.insert(sub_attribute.name.clone(), value);
                    }
                    // association columns are read by their own fetch
                    other => {
                        for _ in 0..other.column_span() {
                            columns.next();
                        }
                    }
                }
            }

            if state.values().all(|value| *value == AttributeValue::Null) {
                return Ok(AttributeValue::Null);
            }

            Ok(AttributeValue::Composite(state))
        }
        other => Err(LoadPlanError::InvariantViolation(format!(
            "cannot hydrate {} attribute '{}' as state",
            other.kind_name(),
            attribute.name
        ))),
    }
}
