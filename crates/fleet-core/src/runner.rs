//! Runner instance model as reported by the runner service.
//!
//! A runner carries two independent status axes: the provider status tracks
//! the underlying infrastructure, the service status tracks job execution.
//! Both must be consulted before a runner is treated as removable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{PoolId, RunnerId, RunnerName};

/// Infrastructure-level lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// The instance is up.
    Running,
    /// The instance exists but is stopped.
    Stopped,
    /// The provider reported an error for this instance.
    Error,
    /// Creation has been requested but not started.
    PendingCreate,
    /// Deletion has been requested but not started.
    PendingDelete,
    /// Forced deletion has been requested but not started.
    PendingForceDelete,
    /// The provider is creating the instance.
    Creating,
    /// The provider is deleting the instance.
    Deleting,
    /// The instance is gone.
    Deleted,
    /// Any status this build does not recognize.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ProviderStatus {
    /// Returns true if issuing a delete for an instance in this state is safe.
    ///
    /// Instances still being provisioned or already on their way out are
    /// excluded to avoid double deletes and tearing down half-built hosts.
    #[must_use]
    pub const fn is_deletable(self) -> bool {
        matches!(self, Self::Running | Self::Error)
    }
}

/// Job-execution state of a runner as seen by the runner service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Registered and waiting for a job.
    Idle,
    /// Executing a job.
    Active,
    /// Waiting to register.
    Pending,
    /// Runner software is being installed.
    Installing,
    /// The runner has finished and deregistered.
    Terminated,
    /// Installation or registration failed.
    Failed,
    /// Any status this build does not recognize.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ServiceStatus {
    /// Returns true if the runner is not executing a job.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// A runner instance snapshot.
///
/// Runners are created and destroyed by the runner service; this type is only
/// ever read from list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    /// Service-assigned instance ID.
    pub id: RunnerId,
    /// Instance name, used to address the instance in API calls.
    pub name: RunnerName,
    /// Pool the runner belongs to. Absent for runners outside any pool.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub pool_id: Option<PoolId>,
    /// Infrastructure-level status.
    #[serde(rename = "status", default)]
    pub provider_status: ProviderStatus,
    /// Job-execution status.
    #[serde(rename = "runner_status", default)]
    pub service_status: ServiceStatus,
    /// Time of the last state transition reported by the service.
    pub updated_at: DateTime<Utc>,
}

impl Runner {
    /// How long the runner has been in its current state at `now`.
    #[must_use]
    pub fn state_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<PoolId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => PoolId::new(s).map(Some).map_err(serde::de::Error::custom),
    }
}
