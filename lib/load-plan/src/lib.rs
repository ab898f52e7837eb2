pub mod cache;
pub mod error;
pub mod fragment;
pub mod metadata;
pub mod plan;
pub mod process;
pub mod row;
pub mod strategy;
pub mod value;

#[cfg(test)]
mod tests;

pub use cache::LoadPlanCache;
pub use error::LoadPlanError;
pub use plan::{builder::LoadPlanBuilder, LoadPlan};
pub use process::processor::{LoadResults, ResultSetProcessor};
