use std::sync::Arc;

use load_plan_config::builder::PlanBuilderConfig;
use petgraph::stable_graph::NodeIndex;
use tracing::{debug, instrument, trace};

use crate::{
    error::LoadPlanError,
    metadata::{AttributeDefinition, AttributeType, EntityPersister, MetadataProvider},
    plan::{EntityReturn, LoadPlan},
    strategy::{FetchStrategy, FetchStyle, FetchTiming},
};

/// Hands out unique table aliases within one plan: the lowercase first letter of the
/// entity's short name followed by a plan-wide sequence number.
#[derive(Debug, Clone)]
pub struct AliasResolutionContext {
    next_sequence: usize,
}

impl AliasResolutionContext {
    pub fn new(sequence_start: usize) -> Self {
        AliasResolutionContext {
            next_sequence: sequence_start,
        }
    }

    pub fn generate(&mut self, entity_short_name: &str) -> String {
        let prefix = entity_short_name
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .filter(char::is_ascii_alphabetic)
            .unwrap_or('t');
        let alias = format!("{}{}", prefix, self.next_sequence);
        self.next_sequence += 1;

        alias
    }
}

/// Everything fetch owners need while building their fetches.
pub struct LoadPlanBuildingContext {
    metadata: Arc<dyn MetadataProvider>,
    config: PlanBuilderConfig,
    aliases: AliasResolutionContext,
}

impl LoadPlanBuildingContext {
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: PlanBuilderConfig) -> Self {
        LoadPlanBuildingContext {
            aliases: AliasResolutionContext::new(config.alias_sequence_start),
            metadata,
            config,
        }
    }

    pub fn entity_persister(
        &self,
        entity_name: &str,
    ) -> Result<Arc<EntityPersister>, LoadPlanError> {
        self.metadata
            .entity_persister(entity_name)
            .ok_or_else(|| LoadPlanError::UnknownEntity(entity_name.to_string()))
    }

    pub fn config(&self) -> &PlanBuilderConfig {
        &self.config
    }

    pub fn aliases_mut(&mut self) -> &mut AliasResolutionContext {
        &mut self.aliases
    }
}

/// Builds the load plan of a root entity by walking its mapped attributes.
pub struct LoadPlanBuilder {
    metadata: Arc<dyn MetadataProvider>,
    config: PlanBuilderConfig,
}

impl LoadPlanBuilder {
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: PlanBuilderConfig) -> Self {
        LoadPlanBuilder { metadata, config }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn build_root_entity_load_plan(
        &self,
        entity_name: &str,
    ) -> Result<LoadPlan, LoadPlanError> {
        let mut context = LoadPlanBuildingContext::new(self.metadata.clone(), self.config.clone());
        let persister = context.entity_persister(entity_name)?;
        let alias = context.aliases_mut().generate(persister.short_name());

        let mut plan = LoadPlan::new();
        let root = plan.add_return(EntityReturn::new(persister.clone(), alias));
        let mut entity_path = vec![persister.entity_name.clone()];

        walk_attributes(
            &mut plan,
            &mut context,
            root,
            &persister.attributes,
            &mut entity_path,
        )?;

        debug!(
            "built load plan for {} with {} nodes",
            persister.entity_name,
            plan.node_count()
        );

        Ok(plan)
    }
}

fn walk_attributes(
    plan: &mut LoadPlan,
    context: &mut LoadPlanBuildingContext,
    owner: NodeIndex,
    attributes: &[AttributeDefinition],
    entity_path: &mut Vec<String>,
) -> Result<(), LoadPlanError> {
    for attribute in attributes {
        match &attribute.attribute_type {
            // basic state is hydrated by the owning entity reference
            AttributeType::Basic(_) => {}
            AttributeType::Composite(composite) => {
                let fetch = plan
                    .fetch_owner(owner)?
                    .build_composite_fetch(owner, attribute, context)?;
                let index = plan.add_fetch(fetch.into())?;
                trace!("composite fetch [{}] for '{}'", index.index(), attribute.name);

                walk_attributes(plan, context, index, &composite.attributes, entity_path)?;
            }
            AttributeType::Entity(association) => {
                let fetch_strategy = determine_fetch_strategy(
                    context,
                    &association.entity_name,
                    association.fetch,
                    entity_path,
                );
                let fetch = plan
                    .fetch_owner(owner)?
                    .build_entity_fetch(owner, attribute, fetch_strategy, context)?;
                let index = plan.add_fetch(fetch.into())?;
                trace!(
                    "entity fetch [{}] for '{}' ({})",
                    index.index(),
                    attribute.name,
                    fetch_strategy
                );

                if fetch_strategy.is_join_fetched() {
                    let persister = context.entity_persister(&association.entity_name)?;
                    entity_path.push(persister.entity_name.clone());
                    walk_attributes(plan, context, index, &persister.attributes, entity_path)?;
                    entity_path.pop();
                }
            }
            AttributeType::Collection(collection) => {
                let fetch_strategy = determine_fetch_strategy(
                    context,
                    &collection.element_entity,
                    collection.fetch,
                    entity_path,
                );
                let fetch = plan
                    .fetch_owner(owner)?
                    .build_collection_fetch(owner, attribute, fetch_strategy, context)?;
                let index = plan.add_fetch(fetch.into())?;
                trace!(
                    "collection fetch [{}] for '{}' ({})",
                    index.index(),
                    attribute.name,
                    fetch_strategy
                );
            }
        }
    }

    Ok(())
}

/// A joined association stays joined unless it leads back to an entity already on the
/// current path or goes deeper than the configured limit; those are loaded by a select.
fn determine_fetch_strategy(
    context: &LoadPlanBuildingContext,
    target_entity: &str,
    mapped: FetchStrategy,
    entity_path: &[String],
) -> FetchStrategy {
    if !mapped.is_join_fetched() {
        return mapped;
    }

    let circular = entity_path.iter().any(|entity| entity == target_entity);
    let too_deep = context
        .config()
        .max_fetch_depth
        .is_some_and(|max_depth| entity_path.len() > max_depth);

    if circular || too_deep {
        trace!(
            "not joining {} (circular: {}, too deep: {})",
            target_entity,
            circular,
            too_deep
        );
        return FetchStrategy::new(FetchTiming::Immediate, FetchStyle::Select);
    }

    mapped
}
