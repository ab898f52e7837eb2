use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PlanCacheConfig {
    /// The maximum number of built load plans kept in memory.
    /// Least recently used plans are evicted first.
    ///
    /// Default: 1000.
    #[serde(default = "default_plan_cache_size")]
    pub size: usize,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            size: default_plan_cache_size(),
        }
    }
}

fn default_plan_cache_size() -> usize {
    1000
}
