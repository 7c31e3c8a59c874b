//! Shared, self-healing session against the runner service.
//!
//! The runner service issues bearer tokens without an advertised expiry, so
//! the only signal that a token went stale is a rejected call. The
//! [`SessionManager`] reacts to that signal: it logs in again and retries the
//! call exactly once.
//!
//! # Single flight
//!
//! Logins are serialized behind an async gate. Every successful login bumps a
//! generation counter; a caller that saw its token rejected remembers the
//! generation it used. Once it holds the gate it first checks whether someone
//! else already produced a newer generation (reuse it) or failed a login while
//! it was waiting (share that failure). Only if neither happened does it log
//! in itself. N callers hitting an expired token therefore cause one login.

use std::future::Future;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::{AuthToken, Credentials, InitRequest, RunnerService};
use crate::context::CallContext;
use crate::error::{Result, ServiceError};
use crate::metrics;
use crate::SessionConfig;

#[derive(Default)]
struct SessionState {
    token: Option<AuthToken>,
    /// Number of successful logins so far.
    generation: u64,
    /// Number of completed logins that failed (cancellations excluded).
    failed_logins: u64,
    last_login_error: Option<ServiceError>,
}

/// Owns the login lifecycle and wraps calls with re-authentication.
///
/// One instance is meant to be shared by every worker in the process, behind
/// an `Arc`. The token itself never leaves the manager except as the opaque
/// [`AuthToken`] handed to the wrapped operation.
pub struct SessionManager<C> {
    client: C,
    config: SessionConfig,
    state: RwLock<SessionState>,
    login_gate: Mutex<()>,
}

impl<C: RunnerService> SessionManager<C> {
    /// Create a session manager. No network call is made until first use.
    #[must_use]
    pub fn new(client: C, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            state: RwLock::new(SessionState::default()),
            login_gate: Mutex::new(()),
        }
    }

    /// The underlying runner service client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns true once a login has succeeded.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().token.is_some()
    }

    /// Number of successful logins performed so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Run `op` with a valid token, logging in again and retrying once if the
    /// token is rejected.
    ///
    /// `operation` labels the call in the call counters. The retry belongs to
    /// the same logical call and is not counted separately.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Authentication` if init or login fails
    /// - `ServiceError::Cancelled` if `ctx` ends first; no retry follows
    /// - the error of `op` if it is not an expired token, or if the retry
    ///   after a fresh login fails as well
    pub async fn ensure_auth<T, F, Fut>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(AuthToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        metrics::record_call(operation);

        let result = self.call_with_reauth(ctx, operation, &mut op).await;
        if let Err(e) = &result {
            metrics::record_failure(operation);
            debug!(operation, error = %e, "Runner service call failed");
        }
        result
    }

    async fn call_with_reauth<T, F, Fut>(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        op: &mut F,
    ) -> Result<T>
    where
        F: FnMut(AuthToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (token, generation) = self.current_token(ctx).await?;

        match ctx.call(op(token)).await {
            Err(err) if err.is_auth_expired() => {
                debug!(operation, generation, "Token rejected, logging in again");
                let (token, _) = self.refresh(ctx, generation).await?;
                ctx.call(op(token)).await
            }
            other => other,
        }
    }

    /// The current token, logging in first if there is none yet.
    async fn current_token(&self, ctx: &CallContext) -> Result<(AuthToken, u64)> {
        {
            let state = self.state.read();
            if let Some(token) = &state.token {
                return Ok((token.clone(), state.generation));
            }
        }
        self.refresh(ctx, 0).await
    }

    /// Replace the token of `stale_generation`, or reuse whatever another
    /// caller produced while we waited for the gate.
    async fn refresh(&self, ctx: &CallContext, stale_generation: u64) -> Result<(AuthToken, u64)> {
        let failures_seen = self.state.read().failed_logins;
        let _gate = ctx.run(self.login_gate.lock()).await?;

        if let Some(outcome) = self.settled_since(stale_generation, failures_seen) {
            return outcome;
        }

        let result = self.login(ctx).await;

        let mut state = self.state.write();
        match result {
            Ok(token) => {
                state.generation += 1;
                state.token = Some(token.clone());
                state.last_login_error = None;
                Ok((token, state.generation))
            }
            Err(err) => {
                // A cancelled login says nothing about the credentials; let
                // the next waiter try with its own context.
                if !err.is_cancelled() {
                    state.failed_logins += 1;
                    state.last_login_error = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Outcome of a login that completed after the caller started waiting.
    fn settled_since(
        &self,
        stale_generation: u64,
        failures_seen: u64,
    ) -> Option<Result<(AuthToken, u64)>> {
        let state = self.state.read();
        if state.generation > stale_generation {
            if let Some(token) = &state.token {
                return Some(Ok((token.clone(), state.generation)));
            }
        }
        if state.failed_logins > failures_seen {
            if let Some(err) = &state.last_login_error {
                return Some(Err(err.clone()));
            }
        }
        None
    }

    /// One init + login round trip.
    async fn login(&self, ctx: &CallContext) -> Result<AuthToken> {
        let init = InitRequest::from(&self.config);
        let credentials = Credentials::from(&self.config);

        let outcome = async {
            ctx.call(self.client.init(&init))
                .await
                .map_err(ServiceError::into_authentication)?;
            ctx.call(self.client.login(&credentials))
                .await
                .map_err(ServiceError::into_authentication)
        }
        .await;

        match &outcome {
            Ok(_) => {
                metrics::record_login(true);
                debug!(base_url = %self.config.base_url, "Logged in to runner service");
            }
            Err(e) if !e.is_cancelled() => {
                metrics::record_login(false);
                debug!(base_url = %self.config.base_url, error = %e, "Runner service login failed");
            }
            Err(_) => {}
        }

        outcome
    }
}
