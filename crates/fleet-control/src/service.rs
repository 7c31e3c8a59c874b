//! One fetch, align, delete pass per pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_session::{CallContext, RunnerService, SessionManager};
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alignment::IdleAlignment;
use crate::error::{ControlError, Result};
use crate::executor::delete_runners;
use crate::fetcher::fetch_pool_runners;
use crate::types::{AlignmentOutcome, ControlConfig, PoolTarget};

/// Aligns pools to their idle policy through a shared session.
pub struct PoolAligner<C> {
    session: Arc<SessionManager<C>>,
    config: ControlConfig,
}

impl<C: RunnerService> PoolAligner<C> {
    /// Create an aligner over a shared session.
    #[must_use]
    pub const fn new(session: Arc<SessionManager<C>>, config: ControlConfig) -> Self {
        Self { session, config }
    }

    /// The shared session.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager<C>> {
        &self.session
    }

    /// The aligner configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Run one pass over `target`, bounded by the configured pass timeout.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Snapshot` if the pool could not be listed,
    /// including when no login succeeds. Failed deletions do not fail the
    /// pass; they are listed in the outcome's report.
    pub async fn align_pool(
        &self,
        ctx: &CallContext,
        target: &PoolTarget,
    ) -> Result<AlignmentOutcome> {
        let ctx = ctx.with_timeout(self.config.pass_timeout);
        let pool_id = &target.pool_id;

        let snapshot = fetch_pool_runners(&self.session, &ctx, pool_id)
            .await
            .map_err(|source| ControlError::Snapshot {
                pool_id: pool_id.clone(),
                source,
            })?;

        let plan = IdleAlignment::new(target.policy, Utc::now()).plan(&snapshot);
        debug!(
            pool_id = %pool_id,
            idle = plan.idle,
            candidates = plan.candidates.len(),
            selected = plan.selected.len(),
            "Computed alignment"
        );

        let report = delete_runners(
            &self.session,
            &ctx,
            pool_id,
            plan.deletion_set(),
            self.config.delete_concurrency,
        )
        .await;

        let outcome = AlignmentOutcome {
            observed: snapshot.len(),
            idle: plan.idle,
            candidates: plan.candidates.len(),
            report,
        };

        if outcome.report.attempted() > 0 {
            info!(
                pool_id = %pool_id,
                deleted = outcome.report.deleted.len(),
                failed = outcome.report.failed.len(),
                "Aligned pool"
            );
        }

        Ok(outcome)
    }

    /// Run one pass over every configured pool concurrently.
    ///
    /// Results are returned in configuration order.
    pub async fn align_all(&self, ctx: &CallContext) -> Vec<(PoolTarget, Result<AlignmentOutcome>)> {
        let passes = self.config.pools.iter().map(|target| async move {
            (target.clone(), self.align_pool(ctx, target).await)
        });
        join_all(passes).await
    }

    /// Align every configured pool once per sync interval until `cancel`
    /// fires. The first pass starts immediately.
    ///
    /// `on_pass` sees each pool's result as soon as its pass completes.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_pass: F)
    where
        F: FnMut(&PoolTarget, &Result<AlignmentOutcome>),
    {
        let period = self.config.sync_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pools = self.config.pools.len(),
            interval_secs = period.as_secs(),
            "Starting alignment loop"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let ctx = CallContext::with_cancel(cancel.child_token());
            for (target, result) in self.align_all(&ctx).await {
                if let Err(e) = &result {
                    warn!(
                        pool_id = %target.pool_id,
                        error = %e,
                        retriable = e.is_retriable(),
                        "Alignment pass failed"
                    );
                }
                on_pass(&target, &result);
            }
        }

        info!("Alignment loop stopped");
    }
}
