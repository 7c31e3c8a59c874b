//! Pool snapshot retrieval.

use fleet_core::{PoolId, Runner};
use fleet_session::{CallContext, Result, RunnerService, SessionManager};
use tracing::debug;

/// Operation label for list calls.
pub const LIST_OPERATION: &str = "list_pool_instances";

/// Fetch the current runners of a pool.
///
/// Every call is a fresh round trip; snapshots are never cached.
///
/// # Errors
///
/// Returns the session error if the list call fails.
pub async fn fetch_pool_runners<C: RunnerService>(
    session: &SessionManager<C>,
    ctx: &CallContext,
    pool_id: &PoolId,
) -> Result<Vec<Runner>> {
    let runners = session
        .ensure_auth(ctx, LIST_OPERATION, |token| async move {
            session.client().list_pool_instances(&token, pool_id).await
        })
        .await?;

    debug!(pool_id = %pool_id, count = runners.len(), "Fetched pool snapshot");
    Ok(runners)
}
