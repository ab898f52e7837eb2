pub mod builder;
pub mod cache;
mod env_overrides;
pub mod log;
pub mod processing;

use config::{Config, File, FileFormat, FileSourceFile};
use envconfig::Envconfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::{
    builder::PlanBuilderConfig,
    cache::PlanCacheConfig,
    env_overrides::{EnvVarOverrides, EnvVarOverridesError},
    log::LoggingConfig,
    processing::ProcessingConfig,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LoadPlanConfig {
    /// The logger configuration.
    #[serde(default)]
    pub log: LoggingConfig,

    /// Configuration for building load plans out of the entity metadata.
    #[serde(default)]
    pub builder: PlanBuilderConfig,

    /// Configuration for processing result rows with a load plan.
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Configuration for the cache of built load plans.
    #[serde(default)]
    pub cache: PlanCacheConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadPlanConfigError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to apply configuration overrides: {0}")]
    EnvVarOverridesError(#[from] EnvVarOverridesError),
    #[error("Failed to load the environment variables: {0}")]
    EnvVarLoadError(#[from] envconfig::Error),
    #[error("Failed to parse the configuration file path: {0}")]
    ConfigPathParseError(Infallible),
    #[error("Failed to serialize the configuration schema: {0}")]
    SchemaSerializationError(#[from] serde_json::Error),
}

static DEFAULT_FILE_NAMES: &[&str] = &[
    "loadplan.config.yaml",
    "loadplan.config.yml",
    "loadplan.config.json",
    "loadplan.config.json5",
];

pub fn load_config(
    override_config_path: Option<String>,
) -> Result<LoadPlanConfig, LoadPlanConfigError> {
    let env_overrides = EnvVarOverrides::init_from_env()?;
    let mut config = Config::builder();

    if let Some(path_str) = override_config_path {
        let path_buf = path_str
            .parse::<std::path::PathBuf>()
            .map_err(LoadPlanConfigError::ConfigPathParseError)?;
        let as_file: File<FileSourceFile, _> = path_buf.into();

        config = config.add_source(as_file.required(true));
    } else {
        for name in DEFAULT_FILE_NAMES {
            config = config.add_source(File::with_name(name).required(false));
        }
    }

    config = env_overrides.apply_overrides(config)?;

    Ok(config.build()?.try_deserialize::<LoadPlanConfig>()?)
}

pub fn parse_yaml_config(config_raw: &str) -> Result<LoadPlanConfig, LoadPlanConfigError> {
    Config::builder()
        .add_source(File::from_str(config_raw, FileFormat::Yaml))
        .build()?
        .try_deserialize::<LoadPlanConfig>()
        .map_err(LoadPlanConfigError::ConfigLoadError)
}

pub fn config_json_schema() -> Result<String, LoadPlanConfigError> {
    let schema = schemars::schema_for!(LoadPlanConfig);

    Ok(serde_json::to_string_pretty(&schema)?)
}

#[cfg(test)]
mod tests {
    use crate::{log::LogLevel, parse_yaml_config, config_json_schema};

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = parse_yaml_config("{}").expect("empty config should parse");

        assert_eq!(config.builder.max_fetch_depth, None);
        assert_eq!(config.builder.alias_sequence_start, 1);
        assert!(!config.processing.distinct_roots);
        assert_eq!(config.cache.size, 1000);
    }

    #[test]
    fn yaml_sections_are_applied() {
        let config = parse_yaml_config(
            r#"
log:
  level: trace
  filter: load_plan=trace
builder:
  max_fetch_depth: 2
processing:
  distinct_roots: true
cache:
  size: 16
"#,
        )
        .expect("config should parse");

        assert_eq!(config.log.level, LogLevel::Trace);
        assert_eq!(config.log.env_filter(), "load_plan=trace");
        assert_eq!(config.builder.max_fetch_depth, Some(2));
        assert!(config.processing.distinct_roots);
        assert_eq!(config.cache.size, 16);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = parse_yaml_config(
            r#"
builder:
  max_depth: 2
"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn schema_mentions_every_section() {
        let schema = config_json_schema().expect("schema should serialize");

        for section in ["log", "builder", "processing", "cache"] {
            assert!(schema.contains(&format!("\"{section}\"")), "missing {section}");
        }
    }
}
