use indexmap::IndexSet;
use load_plan_config::processing::ProcessingConfig;
use petgraph::stable_graph::NodeIndex;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::{
    error::LoadPlanError,
    plan::LoadPlan,
    process::{
        context::ResultSetProcessingContext,
        instance::{EntityHandle, EntityInstance},
    },
    row::ResultRow,
};

/// Outcome of processing a result set: the root instances per row and every entity
/// materialized along the way, addressed by [`EntityHandle::index`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadResults {
    pub rows: Vec<Vec<Option<EntityHandle>>>,
    pub entities: Vec<EntityInstance>,
}

impl LoadResults {
    pub fn entity(&self, handle: EntityHandle) -> Option<&EntityInstance> {
        self.entities.get(handle.index())
    }

    /// Root instances of the first return, skipping rows without one.
    pub fn roots(&self) -> impl Iterator<Item = &EntityInstance> + '_ {
        self.rows
            .iter()
            .filter_map(|row| row.first().copied().flatten())
            .filter_map(|handle| self.entity(handle))
    }
}

/// Drives a load plan over the rows of a result set.
pub struct ResultSetProcessor<'a> {
    plan: &'a LoadPlan,
    config: ProcessingConfig,
}

impl<'a> ResultSetProcessor<'a> {
    pub fn new(plan: &'a LoadPlan, config: ProcessingConfig) -> Self {
        ResultSetProcessor { plan, config }
    }

    /// Processes every row: hydrate all reachable nodes, resolve them, then read the roots
    /// (which read their fetches). Identity resolution spans the whole batch.
    #[instrument(level = "trace", skip_all)]
    pub fn process<R: ResultRow>(
        &self,
        rows: impl IntoIterator<Item = R>,
    ) -> Result<LoadResults, LoadPlanError> {
        let mut context = ResultSetProcessingContext::new(self.plan);
        let nodes = self.plan.reachable_nodes();
        let mut results = Vec::new();
        let mut seen_roots = IndexSet::new();

        for (position, row) in rows.into_iter().enumerate() {
            trace!("processing row {}", position);
            let row_results = self.process_row(&row, &nodes, &mut context)?;

            if self.config.distinct_roots && !seen_roots.insert(row_results.clone()) {
                continue;
            }
            results.push(row_results);
        }

        let entities = context.into_entities();
        debug!(
            "processed {} result rows into {} entities",
            results.len(),
            entities.len()
        );

        Ok(LoadResults {
            rows: results,
            entities,
        })
    }

    fn process_row(
        &self,
        row: &dyn ResultRow,
        nodes: &[NodeIndex],
        context: &mut ResultSetProcessingContext,
    ) -> Result<Vec<Option<EntityHandle>>, LoadPlanError> {
        for index in nodes {
            self.plan.hydrate_node(*index, row, context)?;
        }
        for index in nodes {
            self.plan.resolve_node(*index, row, context)?;
        }

        let mut roots = Vec::with_capacity(self.plan.returns().len());
        for root in self.plan.returns() {
            roots.push(self.plan.read_return(*root, row, context)?);
        }
        context.finish_row();

        Ok(roots)
    }
}
