use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Crates whose events are enabled at the configured level when no explicit filter is set.
const LOAD_PLAN_TARGETS: [&str; 3] = ["load_plan", "load_plan_config", "lp_dev_cli"];

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Level for the load plan crates. Other crates only report warnings.
    ///
    /// Overridden by `LOG_LEVEL`.
    #[serde(default)]
    pub level: LogLevel,

    /// How events are written to stderr. Overridden by `LOG_FORMAT`.
    #[serde(default)]
    pub format: LogFormat,

    /// A full `tracing` filter directive, replacing `level` when set.
    /// Overridden by `LOG_FILTER`.
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit an event when a plan building, copy or read span closes.
    #[serde(default)]
    pub span_events: bool,
}

impl LoggingConfig {
    pub fn env_filter(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }

        let level = self.level.as_str();
        LOAD_PLAN_TARGETS
            .iter()
            .fold(String::from("warn"), |directives, target| {
                format!("{directives},{target}={level}")
            })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown log {setting} '{value}'")]
pub struct UnknownLogSetting {
    setting: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogSetting;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownLogSetting {
                setting: "level",
                value: value.to_string(),
            })
    }
}

/// `pretty-tree` nests events under the plan spans that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    PrettyTree,
    PrettyCompact,
    Json,
}

impl LogFormat {
    const ALL: [LogFormat; 3] = [LogFormat::PrettyTree, LogFormat::PrettyCompact, LogFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::PrettyTree => "pretty-tree",
            LogFormat::PrettyCompact => "pretty-compact",
            LogFormat::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = UnknownLogSetting;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LogFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownLogSetting {
                setting: "format",
                value: value.to_string(),
            })
    }
}
