use std::fmt::{Display, Formatter as FmtFormatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// When an attribute is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchTiming {
    Immediate,
    Lazy,
}

/// How an attribute is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStyle {
    Join,
    Select,
    Subselect,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchStrategy {
    pub timing: FetchTiming,
    pub style: FetchStyle,
}

impl FetchStrategy {
    pub const IMMEDIATE_JOIN: FetchStrategy =
        FetchStrategy::new(FetchTiming::Immediate, FetchStyle::Join);

    pub const fn new(timing: FetchTiming, style: FetchStyle) -> Self {
        FetchStrategy { timing, style }
    }

    /// Joined fetches are read out of the same row as their owner; everything else
    /// is left for a subsequent load.
    pub fn is_join_fetched(&self) -> bool {
        self.timing == FetchTiming::Immediate && self.style == FetchStyle::Join
    }
}

impl Display for FetchStrategy {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        let timing = match self.timing {
            FetchTiming::Immediate => "IMMEDIATE",
            FetchTiming::Lazy => "LAZY",
        };
        let style = match self.style {
            FetchStyle::Join => "JOIN",
            FetchStyle::Select => "SELECT",
            FetchStyle::Subselect => "SUBSELECT",
            FetchStyle::Batch => "BATCH",
        };

        write!(f, "{timing}/{style}")
    }
}
