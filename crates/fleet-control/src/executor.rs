//! Deletion of selected runners.

use fleet_core::{PoolId, RunnerName};
use fleet_session::{CallContext, RunnerService, SessionManager};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::types::{DeletionFailure, DeletionReport};

/// Operation label for delete calls.
pub const DELETE_OPERATION: &str = "delete_instance";

/// Delete `runners` through the session, at most `concurrency` at a time.
///
/// Each runner is attempted independently; one failure never stops the
/// others. A runner the service no longer knows is reported as deleted.
pub async fn delete_runners<C: RunnerService>(
    session: &SessionManager<C>,
    ctx: &CallContext,
    pool_id: &PoolId,
    runners: Vec<RunnerName>,
    concurrency: usize,
) -> DeletionReport {
    let outcomes: Vec<_> = stream::iter(runners)
        .map(|name| async move {
            let result = session
                .ensure_auth(ctx, DELETE_OPERATION, |token| {
                    let name = &name;
                    async move { session.client().delete_instance(&token, name).await }
                })
                .await;
            (name, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = DeletionReport::new(pool_id.clone());
    for (name, result) in outcomes {
        match result {
            Ok(()) => {
                debug!(pool_id = %pool_id, runner = %name, "Deleted runner");
                report.deleted.push(name);
            }
            Err(e) if e.is_not_found() => {
                debug!(pool_id = %pool_id, runner = %name, "Runner already gone");
                report.deleted.push(name);
            }
            Err(error) => {
                warn!(pool_id = %pool_id, runner = %name, error = %error, "Failed to delete runner");
                report.failed.push(DeletionFailure {
                    runner: name,
                    error,
                });
            }
        }
    }
    report
}
