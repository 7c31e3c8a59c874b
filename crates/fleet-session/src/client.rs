//! Runner service client.
//!
//! This module defines the [`RunnerService`] capability consumed by the
//! session manager and its HTTP implementation. Errors are classified so the
//! session manager can tell a rejected token (`AuthorizationExpired`) from
//! everything else.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{PoolId, Runner, RunnerName};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};
use crate::SessionConfig;

/// Bearer token issued by the runner service.
///
/// The value is never printed; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(Arc::from(token.as_ref()))
    }

    /// The raw token, for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Request payload for login.
#[derive(Clone, Serialize)]
pub struct Credentials {
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request payload for first-run initialization.
#[derive(Clone, Serialize)]
pub struct InitRequest {
    /// Admin username to create.
    pub username: String,
    /// Admin password to set.
    pub password: String,
    /// Admin email.
    pub email: String,
    /// Display name of the admin account.
    pub full_name: String,
}

impl fmt::Debug for InitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl From<&SessionConfig> for Credentials {
    fn from(config: &SessionConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

impl From<&SessionConfig> for InitRequest {
    fn from(config: &SessionConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            email: config.init_email(),
            full_name: config.manager_name.clone(),
        }
    }
}

/// Operations the session layer needs from the runner service.
///
/// Implementations must report a rejected token as
/// `ServiceError::AuthorizationExpired` so the session manager can log in
/// again and retry.
#[async_trait]
pub trait RunnerService: Send + Sync {
    /// Bootstrap the service. Succeeds if it is already initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects or cannot process the request.
    async fn init(&self, request: &InitRequest) -> Result<()>;

    /// Exchange credentials for a session token.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Authentication` for rejected credentials.
    async fn login(&self, credentials: &Credentials) -> Result<AuthToken>;

    /// List the runner instances of a pool.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AuthorizationExpired` if the token is rejected.
    async fn list_pool_instances(&self, token: &AuthToken, pool_id: &PoolId)
        -> Result<Vec<Runner>>;

    /// Delete a runner instance by name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AuthorizationExpired` if the token is rejected.
    async fn delete_instance(&self, token: &AuthToken, name: &RunnerName) -> Result<()>;
}

#[async_trait]
impl<T: RunnerService + ?Sized> RunnerService for Arc<T> {
    async fn init(&self, request: &InitRequest) -> Result<()> {
        (**self).init(request).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthToken> {
        (**self).login(credentials).await
    }

    async fn list_pool_instances(
        &self,
        token: &AuthToken,
        pool_id: &PoolId,
    ) -> Result<Vec<Runner>> {
        (**self).list_pool_instances(token, pool_id).await
    }

    async fn delete_instance(&self, token: &AuthToken, name: &RunnerName) -> Result<()> {
        (**self).delete_instance(token, name).await
    }
}

/// Raw response from the login endpoint.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Error body returned by the runner service.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

impl ApiErrorResponse {
    fn message(self) -> String {
        match self.details {
            Some(details) if !details.is_empty() => format!("{}: {details}", self.error),
            _ => self.error,
        }
    }
}

/// HTTP client for the runner service REST API.
#[derive(Debug, Clone)]
pub struct HttpRunnerService {
    client: reqwest::Client,
    config: SessionConfig,
}

impl HttpRunnerService {
    /// Create a new client from the session configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.manager_name.clone())
            .build()
            .map_err(|e| ServiceError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Get the base URL of the runner service.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Turn a non-success response into an error, reading the body if it
    /// matches the service's error format.
    async fn error_from_response(response: reqwest::Response) -> ServiceError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return ServiceError::AuthorizationExpired;
        }

        let message = response
            .json::<ApiErrorResponse>()
            .await
            .map_or_else(|_| format!("runner service returned status {status}"), ApiErrorResponse::message);

        ServiceError::status(status.as_u16(), message)
    }
}

#[async_trait]
impl RunnerService for HttpRunnerService {
    async fn init(&self, request: &InitRequest) -> Result<()> {
        let response = self
            .client
            .post(self.config.first_run_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("init request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(base_url = %self.config.base_url, "Initialized runner service");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            tracing::debug!(base_url = %self.config.base_url, "Runner service already initialized");
            return Ok(());
        }

        Err(Self::error_from_response(response).await)
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthToken> {
        let response = self
            .client
            .post(self.config.login_url())
            .json(credentials)
            .send()
            .await
            .map_err(|e| ServiceError::Authentication(format!("login request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: LoginResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::Authentication(format!("invalid login response: {e}")))?;

            if body.token.is_empty() {
                return Err(ServiceError::Authentication(
                    "login response carried an empty token".to_string(),
                ));
            }
            return Ok(AuthToken::new(body.token));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ServiceError::Authentication("invalid credentials".to_string()));
        }

        Err(Self::error_from_response(response).await.into_authentication())
    }

    async fn list_pool_instances(
        &self,
        token: &AuthToken,
        pool_id: &PoolId,
    ) -> Result<Vec<Runner>> {
        let response = self
            .client
            .get(self.config.pool_instances_url(pool_id))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("list instances request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json::<Vec<Runner>>()
            .await
            .map_err(|e| ServiceError::transport(format!("failed to parse instance list: {e}")))
    }

    async fn delete_instance(&self, token: &AuthToken, name: &RunnerName) -> Result<()> {
        let response = self
            .client
            .delete(self.config.instance_url(name))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| ServiceError::transport(format!("delete instance request failed: {e}")))?;

        if response.status().is_success() {
            tracing::debug!(runner = %name, "Deleted runner instance");
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }
}
