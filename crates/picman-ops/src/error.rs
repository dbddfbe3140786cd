//! Error types for compositing and drawable operations.

use thiserror::Error;

/// Error type for compositing and drawable operations.
#[derive(Error, Debug)]
pub enum OpsError {
    /// The layer mode has no formula for the destination format.
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A filter node was used in a state that does not allow it.
    #[error("invalid node state: {0}")]
    InvalidNodeState(String),

    /// Buffer, format or cache failure.
    #[error(transparent)]
    Core(#[from] picman_core::Error),
}

impl OpsError {
    /// Wrapped core error, if any.
    pub fn as_core(&self) -> Option<&picman_core::Error> {
        match self {
            Self::Core(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for compositing and drawable operations.
pub type OpsResult<T> = Result<T, OpsError>;
