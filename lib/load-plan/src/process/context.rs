use indexmap::IndexSet;
use petgraph::stable_graph::NodeIndex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::{
    error::LoadPlanError,
    plan::LoadPlan,
    process::instance::{AttributeState, EntityHandle, EntityInstance},
    value::EntityKey,
};

/// Per-row state of a single entity reference: the key and raw state hydrated from the
/// current row, and the instance the key resolved to.
#[derive(Debug, Default, Clone)]
pub struct EntityReferenceProcessingState {
    entity_key: Option<EntityKey>,
    hydrated_state: Option<AttributeState>,
    entity_instance: Option<EntityHandle>,
}

impl EntityReferenceProcessingState {
    pub fn entity_key(&self) -> Option<&EntityKey> {
        self.entity_key.as_ref()
    }

    pub fn hydrated_state(&self) -> Option<&AttributeState> {
        self.hydrated_state.as_ref()
    }

    pub fn entity_instance(&self) -> Option<EntityHandle> {
        self.entity_instance
    }

    pub(crate) fn register_hydrated(
        &mut self,
        entity_key: Option<EntityKey>,
        hydrated_state: Option<AttributeState>,
    ) {
        self.entity_key = entity_key;
        self.hydrated_state = hydrated_state;
    }

    pub(crate) fn register_instance(&mut self, entity_instance: EntityHandle) {
        self.entity_instance = Some(entity_instance);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// State of one result-set execution.
///
/// Processing states are per row and cleared by [`ResultSetProcessingContext::finish_row`];
/// materialized entities live for the whole execution, so the same [`EntityKey`] always
/// resolves to the same [`EntityHandle`].
#[derive(Debug, Default)]
pub struct ResultSetProcessingContext {
    processing_states: FxHashMap<NodeIndex, EntityReferenceProcessingState>,
    entities: Vec<EntityInstance>,
    entities_by_key: FxHashMap<EntityKey, EntityHandle>,
    row_reads: IndexSet<(NodeIndex, EntityHandle)>,
}

impl ResultSetProcessingContext {
    /// Creates a context with every entity reference reachable in `plan` registered.
    pub fn new(plan: &LoadPlan) -> Self {
        let mut context = Self::default();
        let mut registered = FxHashSet::default();

        for index in plan.reachable_nodes() {
            let is_reference = plan
                .node(index)
                .is_ok_and(|node| node.as_entity_reference().is_some());

            if is_reference && registered.insert(index) {
                context.register_entity_reference(index);
            }
        }

        context
    }

    pub fn register_entity_reference(&mut self, entity_reference: NodeIndex) {
        self.processing_states
            .entry(entity_reference)
            .or_default();
    }

    pub fn get_processing_state(
        &self,
        entity_reference: NodeIndex,
    ) -> Result<&EntityReferenceProcessingState, LoadPlanError> {
        self.processing_states
            .get(&entity_reference)
            .ok_or(LoadPlanError::UnregisteredEntityReference(
                entity_reference.index(),
            ))
    }

    pub fn get_processing_state_mut(
        &mut self,
        entity_reference: NodeIndex,
    ) -> Result<&mut EntityReferenceProcessingState, LoadPlanError> {
        self.processing_states
            .get_mut(&entity_reference)
            .ok_or(LoadPlanError::UnregisteredEntityReference(
                entity_reference.index(),
            ))
    }

    /// Returns the instance registered for `key`, materializing it from the state hydrated
    /// by `entity_reference` on first use.
    pub fn resolve_entity_key(
        &mut self,
        key: &EntityKey,
        entity_reference: NodeIndex,
    ) -> Result<EntityHandle, LoadPlanError> {
        let processing_state = self.get_processing_state(entity_reference)?;

        if let Some(handle) = self.entities_by_key.get(key) {
            return Ok(*handle);
        }
        let hydrated_state = processing_state.hydrated_state().cloned();

        let handle = EntityHandle::new(self.entities.len());
        trace!(
            "materializing {} as instance #{} for reference [{}]",
            key,
            handle.index(),
            entity_reference.index()
        );
        self.entities.push(EntityInstance::new(
            key.clone(),
            hydrated_state.unwrap_or_default(),
        ));
        self.entities_by_key.insert(key.clone(), handle);

        Ok(handle)
    }

    pub fn entity(&self, handle: EntityHandle) -> Result<&EntityInstance, LoadPlanError> {
        self.entities
            .get(handle.index())
            .ok_or(LoadPlanError::UnknownEntityInstance(handle.index()))
    }

    pub fn entity_mut(
        &mut self,
        handle: EntityHandle,
    ) -> Result<&mut EntityInstance, LoadPlanError> {
        self.entities
            .get_mut(handle.index())
            .ok_or(LoadPlanError::UnknownEntityInstance(handle.index()))
    }

    pub fn entity_by_key(&self, key: &EntityKey) -> Option<EntityHandle> {
        self.entities_by_key.get(key).copied()
    }

    pub fn entities(&self) -> &[EntityInstance] {
        &self.entities
    }

    /// Records that `fetch` is read against `owner` in the current row. Returns `false` when
    /// that already happened, which is how reads terminate on circular plans.
    pub(crate) fn register_read(&mut self, fetch: NodeIndex, owner: EntityHandle) -> bool {
        self.row_reads.insert((fetch, owner))
    }

    /// Reads performed in the current row, in the order they happened.
    pub fn row_reads(&self) -> impl Iterator<Item = (NodeIndex, EntityHandle)> + '_ {
        self.row_reads.iter().copied()
    }

    pub fn finish_row(&mut self) {
        for state in self.processing_states.values_mut() {
            state.reset();
        }
        self.row_reads.clear();
    }

    pub fn into_entities(self) -> Vec<EntityInstance> {
        self.entities
    }
}
