//! Authenticated session management for the runner service API.
//!
//! This crate owns the login lifecycle against the runner service and wraps
//! every API call with re-authentication-and-retry semantics:
//!
//! - [`SessionManager::ensure_auth`] runs a call with the current token,
//!   logs in again when the token is rejected, and retries exactly once
//! - Concurrent callers that hit an expired token share one login round trip
//! - Every call honors a caller-supplied [`CallContext`] (cancellation and
//!   deadline)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Reconcile       │────▶│  SessionManager  │  one per process, shared
//! │  workers (N)     │     │  (ensure_auth)   │  behind Arc
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │  RunnerService   │
//!                          │  (trait)         │
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │ HttpRunnerService│
//!                          └────────┬─────────┘
//!                                   │ HTTPS
//!                          ┌────────▼─────────┐
//!                          │  Runner service  │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleet_core::PoolId;
//! use fleet_session::{CallContext, HttpRunnerService, RunnerService, SessionConfig, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new("https://garm.example.com", "admin", "s3cret");
//! let client = HttpRunnerService::new(config.clone())?;
//! let session = Arc::new(SessionManager::new(client, config));
//!
//! let pool_id: PoolId = "8ec6b1a4-5d3c-4d8f-9c58-0a6f4bba7d11".parse()?;
//! let ctx = CallContext::new();
//! let client = session.client();
//! let runners = session
//!     .ensure_auth(&ctx, "list_pool_instances", |token| {
//!         let pool_id = &pool_id;
//!         async move { client.list_pool_instances(&token, pool_id).await }
//!     })
//!     .await?;
//!
//! println!("pool has {} runners", runners.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::fmt;
use std::time::Duration;

pub mod client;
pub mod context;
pub mod error;
pub mod metrics;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{AuthToken, Credentials, HttpRunnerService, InitRequest, RunnerService};
pub use context::CallContext;
pub use error::{ConfigError, Result, ServiceError};
pub use session::SessionManager;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRunnerService;

/// Connection and credential settings for the runner service.
#[derive(Clone)]
pub struct SessionConfig {
    /// Base URL of the runner service (e.g., `https://garm.example.com`).
    pub base_url: String,
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
    /// Name this manager identifies itself with (`User-Agent`, init full name).
    pub manager_name: String,
    /// Email used when bootstrapping the service. Derived from the username
    /// and manager name when unset.
    pub email: Option<String>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Default manager name.
    pub const DEFAULT_MANAGER_NAME: &'static str = "runner-fleet";

    /// Create a configuration with default manager name and timeout.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            manager_name: Self::DEFAULT_MANAGER_NAME.to_string(),
            email: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `RUNNER_SERVICE_URL`: Base URL of the runner service (required)
    /// - `RUNNER_SERVICE_USERNAME`: Admin username (required)
    /// - `RUNNER_SERVICE_PASSWORD`: Admin password (required)
    /// - `RUNNER_SERVICE_EMAIL`: Email used for first-run initialization
    /// - `MANAGER_NAME`: Name this manager identifies itself with
    /// - `RUNNER_SERVICE_TIMEOUT_SECONDS`: Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingVar` for the first missing required
    /// variable.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let required =
            |name: &'static str| std::env::var(name).map_err(|_| ConfigError::MissingVar(name));

        let mut config = Self::new(
            required("RUNNER_SERVICE_URL")?,
            required("RUNNER_SERVICE_USERNAME")?,
            required("RUNNER_SERVICE_PASSWORD")?,
        );

        if let Ok(val) = std::env::var("RUNNER_SERVICE_EMAIL") {
            config.email = Some(val);
        }
        if let Ok(val) = std::env::var("MANAGER_NAME") {
            config.manager_name = val;
        }
        if let Ok(val) = std::env::var("RUNNER_SERVICE_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                config.request_timeout = Duration::from_secs(n);
            }
        }

        Ok(config)
    }

    /// Get the first-run (initialization) endpoint URL.
    #[must_use]
    pub fn first_run_url(&self) -> String {
        format!("{}/api/v1/first-run", self.base_url)
    }

    /// Get the login endpoint URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}/api/v1/auth/login", self.base_url)
    }

    /// Get the URL listing the instances of a pool.
    #[must_use]
    pub fn pool_instances_url(&self, pool_id: &fleet_core::PoolId) -> String {
        format!("{}/api/v1/pools/{}/instances", self.base_url, pool_id)
    }

    /// Get the URL of a single instance.
    #[must_use]
    pub fn instance_url(&self, name: &fleet_core::RunnerName) -> String {
        format!("{}/api/v1/instances/{}", self.base_url, name)
    }

    /// Email sent on initialization.
    #[must_use]
    pub fn init_email(&self) -> String {
        self.email
            .clone()
            .unwrap_or_else(|| format!("{}@{}.local", self.username, self.manager_name))
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("manager_name", &self.manager_name)
            .field("email", &self.email)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{PoolId, RunnerName};

    #[test]
    fn config_defaults() {
        let config = SessionConfig::new("https://garm.example.com/", "admin", "pw");
        assert_eq!(config.base_url, "https://garm.example.com");
        assert_eq!(config.manager_name, "runner-fleet");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.email.is_none());
    }

    #[test]
    fn config_urls() {
        let config = SessionConfig::new("https://garm.example.com", "admin", "pw");
        let pool_id = PoolId::new("pool-1").unwrap();
        let name = RunnerName::new("garm-abc").unwrap();

        assert_eq!(
            config.first_run_url(),
            "https://garm.example.com/api/v1/first-run"
        );
        assert_eq!(
            config.login_url(),
            "https://garm.example.com/api/v1/auth/login"
        );
        assert_eq!(
            config.pool_instances_url(&pool_id),
            "https://garm.example.com/api/v1/pools/pool-1/instances"
        );
        assert_eq!(
            config.instance_url(&name),
            "https://garm.example.com/api/v1/instances/garm-abc"
        );
    }

    #[test]
    fn from_env_reports_missing_url() {
        if std::env::var("RUNNER_SERVICE_URL").is_err() {
            assert_eq!(
                SessionConfig::from_env().unwrap_err(),
                ConfigError::MissingVar("RUNNER_SERVICE_URL")
            );
        }
    }

    #[test]
    fn init_email_derivation() {
        let mut config = SessionConfig::new("http://localhost", "admin", "pw");
        assert_eq!(config.init_email(), "admin@runner-fleet.local");

        config.email = Some("ops@example.com".to_string());
        assert_eq!(config.init_email(), "ops@example.com");
    }

    #[test]
    fn debug_redacts_password() {
        let config = SessionConfig::new("http://localhost", "admin", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
