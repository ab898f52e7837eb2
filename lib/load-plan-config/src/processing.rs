use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    /// When `true`, a root entity that appears in several rows (for example because a
    /// collection was joined) is returned only once, in the order of first appearance.
    #[serde(default = "default_distinct_roots")]
    pub distinct_roots: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            distinct_roots: default_distinct_roots(),
        }
    }
}

fn default_distinct_roots() -> bool {
    false
}
