//! Idle-runner alignment.
//!
//! Deciding which runners to delete is a pure function of a pool snapshot, a
//! [`PoolPolicy`], and the current time. The stages are:
//!
//! 1. keep runners whose service status is idle
//! 2. keep those idle for longer than `min_idle_runner_age`
//! 3. keep those whose provider status allows a delete
//! 4. select the first `candidates - min_idle_runners` of what is left
//!
//! Selection follows snapshot order. Runners are not sorted by age before the
//! cut, so with more candidates than excess the first-listed ones go first.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::{Runner, RunnerName};

use crate::types::PoolPolicy;

/// Runners not executing a job.
pub fn idle_runners<'a, I>(runners: I) -> impl Iterator<Item = &'a Runner>
where
    I: IntoIterator<Item = &'a Runner>,
{
    runners
        .into_iter()
        .filter(|r| r.service_status.is_idle())
}

/// Runners whose last state change is strictly more than `min_age` before
/// `now`.
pub fn older_than<'a, I>(
    runners: I,
    min_age: Duration,
    now: DateTime<Utc>,
) -> impl Iterator<Item = &'a Runner>
where
    I: IntoIterator<Item = &'a Runner>,
{
    // An age too large for chrono excludes every runner.
    let min_age = chrono::Duration::from_std(min_age).ok();
    runners
        .into_iter()
        .filter(move |r| min_age.is_some_and(|min| r.state_age(now) > min))
}

/// Runners in a provider state where a delete is safe.
pub fn provider_deletable<'a, I>(runners: I) -> impl Iterator<Item = &'a Runner>
where
    I: IntoIterator<Item = &'a Runner>,
{
    runners
        .into_iter()
        .filter(|r| r.provider_status.is_deletable())
}

/// The leading entries of `candidates` above `min_idle`, in input order.
#[must_use]
pub fn select_excess<T>(candidates: &[T], min_idle: u32) -> &[T] {
    let keep = usize::try_from(min_idle).unwrap_or(usize::MAX);
    let excess = candidates.len().saturating_sub(keep);
    &candidates[..excess]
}

/// Result of running the alignment pipeline over one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentPlan<'a> {
    /// Idle runners in the snapshot.
    pub idle: usize,
    /// Idle runners that passed the age and provider filters, in snapshot
    /// order.
    pub candidates: Vec<&'a Runner>,
    /// Runners to delete, a prefix of `candidates`.
    pub selected: Vec<&'a Runner>,
}

impl AlignmentPlan<'_> {
    /// Names of the selected runners, in selection order.
    #[must_use]
    pub fn deletion_set(&self) -> Vec<RunnerName> {
        self.selected.iter().map(|r| r.name.clone()).collect()
    }
}

/// The alignment pipeline for one policy at one instant.
#[derive(Debug, Clone, Copy)]
pub struct IdleAlignment {
    policy: PoolPolicy,
    now: DateTime<Utc>,
}

impl IdleAlignment {
    /// Align against `policy` as of `now`.
    #[must_use]
    pub const fn new(policy: PoolPolicy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    /// Idle runners old enough and in a deletable provider state.
    #[must_use]
    pub fn candidates<'a>(&self, snapshot: &'a [Runner]) -> Vec<&'a Runner> {
        let old_idle = older_than(
            idle_runners(snapshot),
            self.policy.min_idle_runner_age,
            self.now,
        );
        provider_deletable(old_idle).collect()
    }

    /// Run every stage and keep the intermediate counts.
    #[must_use]
    pub fn plan<'a>(&self, snapshot: &'a [Runner]) -> AlignmentPlan<'a> {
        let idle = idle_runners(snapshot).count();
        let candidates = self.candidates(snapshot);
        let selected = select_excess(&candidates, self.policy.min_idle_runners).to_vec();

        AlignmentPlan {
            idle,
            candidates,
            selected,
        }
    }

    /// Names of the runners to delete, in snapshot order.
    #[must_use]
    pub fn deletion_set(&self, snapshot: &[Runner]) -> Vec<RunnerName> {
        self.plan(snapshot).deletion_set()
    }
}

/// Compute which runners of `snapshot` to delete under `policy` at `now`.
#[must_use]
pub fn compute_deletion_set(
    snapshot: &[Runner],
    policy: &PoolPolicy,
    now: DateTime<Utc>,
) -> Vec<RunnerName> {
    IdleAlignment::new(*policy, now).deletion_set(snapshot)
}
