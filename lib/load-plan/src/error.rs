use crate::{fragment::FragmentResolutionError, row::DataAccessError};

#[derive(Debug, thiserror::Error)]
pub enum LoadPlanError {
    /// The plan was assembled in a way the fetch tree cannot execute. Indicates a defect in
    /// plan construction, never bad input data.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Fetch node {0} has no owner chain leading to an entity reference")]
    MissingOwnerEntityReference(usize),
    #[error("Entity reference {0} was never registered with the processing context")]
    UnregisteredEntityReference(usize),
    #[error("Missing plan node: {0} {1}")]
    MissingNode(usize, String),
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
    #[error("Entity '{0}' must be identified by a single basic attribute")]
    InvalidIdentifier(String),
    #[error("Unknown entity instance: {0}")]
    UnknownEntityInstance(usize),
    #[error("Data access error: {0}")]
    DataAccess(#[from] DataAccessError),
    #[error("Fragment resolution error: {0}")]
    FragmentResolution(#[from] FragmentResolutionError),
}
