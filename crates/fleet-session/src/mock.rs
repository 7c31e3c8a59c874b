//! In-memory runner service for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{PoolId, Runner, RunnerName};
use parking_lot::Mutex;

use crate::client::{AuthToken, Credentials, InitRequest, RunnerService};
use crate::error::{Result, ServiceError};

#[derive(Default)]
struct MockState {
    pools: HashMap<PoolId, Vec<Runner>>,
    valid_token: Option<AuthToken>,
    issued: u64,
    init_calls: usize,
    login_calls: usize,
    list_calls: usize,
    deleted: Vec<RunnerName>,
    reject_next: usize,
    login_failure: Option<ServiceError>,
    delete_failures: HashMap<RunnerName, ServiceError>,
}

/// A runner service that keeps pools in memory and issues counting tokens.
///
/// Only the most recently issued token is accepted. Failures can be
/// programmed per operation.
#[derive(Default)]
pub struct MockRunnerService {
    state: Mutex<MockState>,
    login_delay: Option<Duration>,
}

impl MockRunnerService {
    /// Create an empty mock service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every login take `delay` before answering.
    #[must_use]
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    /// Replace the runners of a pool.
    pub fn set_pool(&self, pool_id: PoolId, runners: Vec<Runner>) {
        self.state.lock().pools.insert(pool_id, runners);
    }

    /// Current runners of a pool.
    #[must_use]
    pub fn pool_runners(&self, pool_id: &PoolId) -> Vec<Runner> {
        self.state
            .lock()
            .pools
            .get(pool_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Invalidate the current token; every call fails with 401 until the
    /// next login.
    pub fn expire_tokens(&self) {
        self.state.lock().valid_token = None;
    }

    /// Reject the next `count` authenticated calls regardless of token.
    pub fn reject_next(&self, count: usize) {
        self.state.lock().reject_next = count;
    }

    /// Make logins fail with `error` until cleared with `None`.
    pub fn set_login_failure(&self, error: Option<ServiceError>) {
        self.state.lock().login_failure = error;
    }

    /// Make deleting `name` fail with `error`.
    pub fn fail_delete(&self, name: RunnerName, error: ServiceError) {
        self.state.lock().delete_failures.insert(name, error);
    }

    /// Number of init calls received.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Number of login calls received.
    #[must_use]
    pub fn login_calls(&self) -> usize {
        self.state.lock().login_calls
    }

    /// Number of list calls received, including rejected ones.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    /// Names of successfully deleted runners, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<RunnerName> {
        self.state.lock().deleted.clone()
    }

    fn authorize(state: &mut MockState, token: &AuthToken) -> Result<()> {
        if state.reject_next > 0 {
            state.reject_next -= 1;
            return Err(ServiceError::AuthorizationExpired);
        }
        if state.valid_token.as_ref() != Some(token) {
            return Err(ServiceError::AuthorizationExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl RunnerService for MockRunnerService {
    async fn init(&self, _request: &InitRequest) -> Result<()> {
        self.state.lock().init_calls += 1;
        Ok(())
    }

    async fn login(&self, _credentials: &Credentials) -> Result<AuthToken> {
        self.state.lock().login_calls += 1;

        if let Some(delay) = self.login_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(err) = state.login_failure.clone() {
            return Err(err);
        }
        state.issued += 1;
        let token = AuthToken::new(format!("mock-token-{}", state.issued));
        state.valid_token = Some(token.clone());
        Ok(token)
    }

    async fn list_pool_instances(
        &self,
        token: &AuthToken,
        pool_id: &PoolId,
    ) -> Result<Vec<Runner>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        Self::authorize(&mut state, token)?;

        state
            .pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| ServiceError::status(404, format!("pool {pool_id} not found")))
    }

    async fn delete_instance(&self, token: &AuthToken, name: &RunnerName) -> Result<()> {
        let mut state = self.state.lock();
        Self::authorize(&mut state, token)?;

        if let Some(err) = state.delete_failures.get(name) {
            return Err(err.clone());
        }

        let mut found = false;
        for runners in state.pools.values_mut() {
            let before = runners.len();
            runners.retain(|r| &r.name != name);
            found |= runners.len() != before;
        }
        if !found {
            return Err(ServiceError::status(404, format!("instance {name} not found")));
        }

        state.deleted.push(name.clone());
        Ok(())
    }
}
