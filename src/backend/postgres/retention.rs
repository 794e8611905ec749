//! Retention task: deletes observations outside the current validity window,
//! rate-limited by a minimum interval between runs.

use super::PostgresBackend;
use crate::errors::StoreResult;
use std::time::Instant;

/// Runs [`cleanup`] if at least `cleanup_interval` has elapsed since the last run.
/// Never fails the caller's write; errors are returned so the caller can log and
/// swallow them.
pub async fn consider_cleanup(backend: &PostgresBackend) -> StoreResult<()> {
    let should_run = {
        let last = backend.last_cleanup.lock().unwrap();
        last.elapsed() >= backend.cleanup_interval
    };
    if !should_run {
        return Ok(());
    }

    cleanup(backend).await?;

    *backend.last_cleanup.lock().unwrap() = Instant::now();
    Ok(())
}

/// Deletes every observation outside `[lo, hi]` inside one transaction, rolling back
/// on error so the caller's already-committed write is never reverted by a failed
/// cleanup.
async fn cleanup(backend: &PostgresBackend) -> StoreResult<()> {
    let (lo, hi) = backend.window.current_window();

    let mut tx = backend.pool().begin().await?;

    let result = sqlx::query(
        "DELETE FROM observation WHERE (obstime_instant < $1) OR (obstime_instant > $2)",
    )
    .bind(lo)
    .bind(hi)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(rows_deleted = result.rows_affected(), "retention cleanup ran");

    // Orphaned time_series/geo_point rows are not pruned here; see DESIGN.md.
    Ok(())
}
