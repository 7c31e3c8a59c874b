//! Policy, configuration, and result types for pool alignment.

use std::str::FromStr;
use std::time::Duration;

use fleet_core::{PoolId, RunnerName};
use fleet_session::ServiceError;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Target idle shape of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolPolicy {
    /// Idle runners to keep around.
    pub min_idle_runners: u32,
    /// How long a runner must have been idle before it may be deleted.
    #[serde(with = "duration_secs")]
    pub min_idle_runner_age: Duration,
}

impl PoolPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(min_idle_runners: u32, min_idle_runner_age: Duration) -> Self {
        Self {
            min_idle_runners,
            min_idle_runner_age,
        }
    }
}

/// A pool and the policy it should be aligned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTarget {
    /// Pool to align.
    pub pool_id: PoolId,
    /// Desired idle shape.
    pub policy: PoolPolicy,
}

impl FromStr for PoolTarget {
    type Err = ControlError;

    /// Parse `pool_id:min_idle[:min_age_seconds]`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split(':');

        let pool_id = PoolId::new(parts.next().unwrap_or_default())?;
        let min_idle_runners = parts
            .next()
            .ok_or_else(|| ControlError::Config(format!("pool target {s:?} is missing min_idle")))?
            .parse()
            .map_err(|e| ControlError::Config(format!("invalid min_idle in {s:?}: {e}")))?;
        let min_age_seconds = match parts.next() {
            Some(raw) => raw
                .parse()
                .map_err(|e| ControlError::Config(format!("invalid min_age in {s:?}: {e}")))?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(ControlError::Config(format!(
                "pool target {s:?} has too many fields"
            )));
        }

        Ok(Self {
            pool_id,
            policy: PoolPolicy::new(min_idle_runners, Duration::from_secs(min_age_seconds)),
        })
    }
}

/// Configuration for the alignment service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Pools to align on every pass.
    pub pools: Vec<PoolTarget>,
    /// Time between passes.
    pub sync_interval: Duration,
    /// Maximum deletions in flight per pool.
    pub delete_concurrency: usize,
    /// Upper bound for one pass over one pool, including all deletions.
    pub pass_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            pools: Vec::new(),
            sync_interval: Duration::from_secs(60),
            delete_concurrency: 4,
            pass_timeout: Duration::from_secs(120),
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `FLEET_POOLS`: comma-separated `pool_id:min_idle[:min_age_seconds]`
    /// - `SYNC_INTERVAL_SECONDS`: time between passes
    /// - `DELETE_CONCURRENCY`: maximum deletions in flight per pool
    /// - `PASS_TIMEOUT_SECONDS`: upper bound for one pass over one pool
    ///
    /// # Errors
    ///
    /// Returns an error if `FLEET_POOLS` contains an invalid entry.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FLEET_POOLS") {
            config.pools = Self::parse_pools(&val)?;
        }
        if let Ok(val) = std::env::var("SYNC_INTERVAL_SECONDS") {
            if let Ok(n) = val.parse() {
                config.sync_interval = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("DELETE_CONCURRENCY") {
            if let Ok(n) = val.parse::<usize>() {
                config.delete_concurrency = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("PASS_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                config.pass_timeout = Duration::from_secs(n);
            }
        }

        Ok(config)
    }

    /// Parse a comma-separated list of pool targets. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for the first invalid entry.
    pub fn parse_pools(raw: &str) -> Result<Vec<PoolTarget>> {
        raw.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

/// A runner whose deletion failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionFailure {
    /// The runner that could not be deleted.
    pub runner: RunnerName,
    /// Why the delete failed.
    pub error: ServiceError,
}

/// Per-runner outcome of a deletion batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    /// Pool the batch belongs to.
    pub pool_id: PoolId,
    /// Runners that are gone, in deletion-set order.
    pub deleted: Vec<RunnerName>,
    /// Runners that could not be deleted, in deletion-set order.
    pub failed: Vec<DeletionFailure>,
}

impl DeletionReport {
    /// An empty report for a pool.
    #[must_use]
    pub const fn new(pool_id: PoolId) -> Self {
        Self {
            pool_id,
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true if every requested deletion succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of deletions attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }
}

/// Summary of one fetch, align, delete pass over a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentOutcome {
    /// Runners in the snapshot.
    pub observed: usize,
    /// Idle runners in the snapshot.
    pub idle: usize,
    /// Idle runners that passed the age and provider filters.
    pub candidates: usize,
    /// What happened to the selected runners.
    pub report: DeletionReport,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pool_target() {
        let target: PoolTarget = "pool-1:2:300".parse().unwrap();
        assert_eq!(target.pool_id.as_str(), "pool-1");
        assert_eq!(target.policy.min_idle_runners, 2);
        assert_eq!(target.policy.min_idle_runner_age, Duration::from_secs(300));
    }

    #[test]
    fn parse_pool_target_default_age() {
        let target: PoolTarget = "pool-1:0".parse().unwrap();
        assert_eq!(target.policy, PoolPolicy::new(0, Duration::ZERO));
    }

    #[test]
    fn parse_pool_target_errors() {
        assert!("pool-1".parse::<PoolTarget>().is_err());
        assert!("pool-1:-1".parse::<PoolTarget>().is_err());
        assert!("pool-1:2:abc".parse::<PoolTarget>().is_err());
        assert!("pool-1:2:30:extra".parse::<PoolTarget>().is_err());
        assert!(matches!(
            ":2".parse::<PoolTarget>(),
            Err(ControlError::InvalidId(_))
        ));
    }

    #[test]
    fn parse_pool_list() {
        let pools = ControlConfig::parse_pools("pool-a:1:60, pool-b:3,").unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[1].pool_id.as_str(), "pool-b");
        assert_eq!(pools[1].policy.min_idle_runners, 3);
    }

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert!(config.pools.is_empty());
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.delete_concurrency, 4);
    }

    #[test]
    fn policy_serializes_age_in_seconds() {
        let policy = PoolPolicy::new(2, Duration::from_secs(600));
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "min_idle_runners": 2, "min_idle_runner_age": 600 })
        );
    }

    #[test]
    fn report_accounting() {
        let mut report = DeletionReport::new(PoolId::new("pool-1").unwrap());
        assert!(report.is_complete());

        report.deleted.push(RunnerName::new("r-1").unwrap());
        report.failed.push(DeletionFailure {
            runner: RunnerName::new("r-2").unwrap(),
            error: ServiceError::status(500, "boom"),
        });
        assert!(!report.is_complete());
        assert_eq!(report.attempted(), 2);
    }
}
