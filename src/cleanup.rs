//! Scheduled cleanup of dead refresh sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::clock::Clock;
use crate::db::Database;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, now: DateTime<Utc>) {
    match db.sessions().delete_expired(now).await {
        Ok(count) if count > 0 => info!(count, "Cleaned up expired sessions"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up expired sessions"),
    }

    // Sessions outlive deleted users until swept here.
    match db.sessions().delete_orphaned().await {
        Ok(count) if count > 0 => info!(count, "Cleaned up orphaned sessions"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to clean up orphaned sessions"),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database, clock: Arc<dyn Clock>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, clock.now()).await;
        }
    })
}
