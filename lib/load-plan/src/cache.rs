use std::{num::NonZeroUsize, sync::Arc};

use load_plan_config::{builder::PlanBuilderConfig, cache::PlanCacheConfig};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::{
    error::LoadPlanError,
    metadata::MetadataProvider,
    plan::{builder::LoadPlanBuilder, visit::ReturnGraphVisitationStrategy, LoadPlan},
};

/// Built load plans per root entity. Cached plans are shared templates; callers that need
/// to adjust a plan for one execution check out a private copy.
#[derive(Clone)]
pub struct LoadPlanCache {
    builder: Arc<LoadPlanBuilder>,
    plans: Arc<Mutex<LruCache<String, Arc<LoadPlan>>>>,
}

impl LoadPlanCache {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        builder_config: PlanBuilderConfig,
        cache_config: &PlanCacheConfig,
    ) -> Self {
        LoadPlanCache {
            builder: Arc::new(LoadPlanBuilder::new(metadata, builder_config)),
            plans: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_config.size).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_or_build(&self, entity_name: &str) -> Result<Arc<LoadPlan>, LoadPlanError> {
        {
            let mut plans = self.plans.lock();
            if let Some(plan) = plans.get(entity_name) {
                debug!("load plan cache hit for {}", entity_name);
                return Ok(plan.clone());
            }
        } // The mutex lock is released

        debug!("load plan cache miss for {}", entity_name);
        let plan = Arc::new(self.builder.build_root_entity_load_plan(entity_name)?);

        {
            let mut plans = self.plans.lock();
            plans.put(entity_name.to_string(), plan.clone());
        } // The mutex lock is released

        Ok(plan)
    }

    /// A private deep copy of the cached plan for `entity_name`.
    pub fn checkout_copy(
        &self,
        entity_name: &str,
        strategy: &mut dyn ReturnGraphVisitationStrategy,
    ) -> Result<LoadPlan, LoadPlanError> {
        self.get_or_build(entity_name)?.make_copy(strategy)
    }

    pub fn len(&self) -> usize {
        self.plans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.lock().is_empty()
    }
}
