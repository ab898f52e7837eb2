use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PlanBuilderConfig {
    /// The maximum depth of joined entity associations below the root entity.
    /// Associations deeper than this are still part of the plan, but are loaded with a
    /// subsequent select instead of being joined into the same result set.
    ///
    /// If not specified, join depth is not limited (circular associations are always cut).
    ///
    /// Can also be set via the `LOAD_PLAN_MAX_FETCH_DEPTH` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fetch_depth: Option<usize>,

    /// The first sequence number used when generating table aliases (`p1`, `a2`, ...).
    #[serde(default = "default_alias_sequence_start")]
    pub alias_sequence_start: usize,
}

impl Default for PlanBuilderConfig {
    fn default() -> Self {
        Self {
            max_fetch_depth: None,
            alias_sequence_start: default_alias_sequence_start(),
        }
    }
}

fn default_alias_sequence_start() -> usize {
    1
}
