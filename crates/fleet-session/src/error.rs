//! Runner service error types.

use thiserror::Error;

/// A result type using `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors that can occur when talking to the runner service.
///
/// The type is `Clone` so that the outcome of a failed login can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Init or login failed: bad credentials, unreachable service, or a
    /// malformed response.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The service no longer accepts the session token.
    #[error("authorization expired")]
    AuthorizationExpired,

    /// Any other failure from the wrapped call.
    #[error("runner service error{}: {message}", .status.map_or_else(String::new, |s| format!(" (HTTP {s})")))]
    Upstream {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// The caller cancelled the call or its deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Errors loading the session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

impl ServiceError {
    /// Build an upstream error for a transport-level failure (no response).
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Build an upstream error for an HTTP response status.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns `true` if the call failed because the token was rejected.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthorizationExpired)
    }

    /// Returns `true` if the service answered 404.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                status: Some(404),
                ..
            }
        )
    }

    /// Returns `true` if the call was cancelled by the caller.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns `true` if retrying on a later pass might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::AuthorizationExpired => true,
            Self::Upstream { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            Self::Authentication(_) | Self::Cancelled(_) => false,
        }
    }

    /// Reclassify a failure that happened while logging in.
    ///
    /// Any failure during init or login means the session could not be
    /// established, except a cancellation which stays a cancellation.
    #[must_use]
    pub fn into_authentication(self) -> Self {
        match self {
            Self::Authentication(_) | Self::Cancelled(_) => self,
            Self::AuthorizationExpired => Self::Authentication("credentials rejected".to_string()),
            Self::Upstream { message, .. } => Self::Authentication(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status() {
        let err = ServiceError::status(404, "instance not found");
        assert_eq!(
            err.to_string(),
            "runner service error (HTTP 404): instance not found"
        );

        let err = ServiceError::transport("connection refused");
        assert_eq!(err.to_string(), "runner service error: connection refused");
    }

    #[test]
    fn classification() {
        assert!(ServiceError::AuthorizationExpired.is_auth_expired());
        assert!(!ServiceError::status(401, "x").is_auth_expired());
        assert!(ServiceError::status(404, "x").is_not_found());
        assert!(!ServiceError::transport("x").is_not_found());
        assert!(ServiceError::Cancelled("deadline exceeded".into()).is_cancelled());
    }

    #[test]
    fn retriable() {
        assert!(ServiceError::transport("reset").is_retriable());
        assert!(ServiceError::status(503, "x").is_retriable());
        assert!(ServiceError::status(429, "x").is_retriable());
        assert!(!ServiceError::status(400, "x").is_retriable());
        assert!(!ServiceError::Authentication("bad password".into()).is_retriable());
        assert!(!ServiceError::Cancelled("x".into()).is_retriable());
    }

    #[test]
    fn login_failures_become_authentication() {
        assert_eq!(
            ServiceError::transport("connection refused").into_authentication(),
            ServiceError::Authentication("connection refused".into())
        );
        assert!(matches!(
            ServiceError::AuthorizationExpired.into_authentication(),
            ServiceError::Authentication(_)
        ));
        assert!(ServiceError::Cancelled("x".into())
            .into_authentication()
            .is_cancelled());
    }

    #[test]
    fn config_error_names_the_variable() {
        assert_eq!(
            ConfigError::MissingVar("RUNNER_SERVICE_URL").to_string(),
            "missing required environment variable RUNNER_SERVICE_URL"
        );
    }
}
