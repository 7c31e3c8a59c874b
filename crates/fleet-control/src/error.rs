//! Error types for pool alignment.

use fleet_core::{IdError, PoolId};
use fleet_session::ServiceError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur while aligning pools.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The snapshot fetch for a pool failed, so no decision was made.
    #[error("failed to fetch runners of pool {pool_id}: {source}")]
    Snapshot {
        /// The pool being aligned.
        pool_id: PoolId,
        /// The underlying failure.
        #[source]
        source: ServiceError,
    },

    /// An identifier in the configuration is invalid.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControlError {
    /// The runner service error behind this failure, if any.
    #[must_use]
    pub const fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Snapshot { source, .. } => Some(source),
            Self::InvalidId(_) | Self::Config(_) => None,
        }
    }

    /// Returns true if the pass could not authenticate at all.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self.service_error(), Some(ServiceError::Authentication(_)))
    }

    /// Returns true if a later pass might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self.service_error() {
            Some(e) => e.is_retriable(),
            None => false,
        }
    }
}
