//! Scheduled removal of expired sessions.

use crate::auth::SessionManager;
use chrono::Utc;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run the expiry sweep once.
pub async fn run_cleanup(sessions: &SessionManager) {
    match sessions.expiry_sweep(Utc::now()).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically, starting one
/// interval from now. Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(sessions: SessionManager) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + CLEANUP_INTERVAL, CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&sessions).await;
        }
    })
}
