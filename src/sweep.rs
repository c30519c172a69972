// ABOUTME: Periodic sweep deleting stale pending guests from the directory
// ABOUTME: Honors a fixed grace window so in-flight registrations are never touched

//! Stale-guest sweep.
//!
//! Guests whose invitation is never redeemed would otherwise accumulate in
//! the directory forever. The sweep runs on its own schedule, lists guests
//! still pending acceptance, and best-effort deletes those older than the
//! grace window. The grace window is deliberately much longer than the
//! pending-flow TTL so the sweep cannot race an in-flight registration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::directory::DirectoryApi;
use crate::errors::GateResult;

/// Run one sweep pass at `now`: delete pending guests created before
/// `now - grace_secs`. Returns how many deletions were attempted.
///
/// # Errors
///
/// Returns the directory error when the pending-guest listing fails.
/// Individual deletions are best-effort and never fail the pass.
pub async fn sweep_once(
    directory: &dyn DirectoryApi,
    grace_secs: i64,
    now: DateTime<Utc>,
) -> GateResult<usize> {
    let cutoff = now - chrono::Duration::seconds(grace_secs);
    let pending = directory.list_pending_guests().await?;

    let mut deleted = 0usize;
    for guest in pending {
        if guest.created_at < cutoff {
            directory.delete_guest(&guest.id).await;
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!("sweep removed {deleted} stale pending guests");
    }
    Ok(deleted)
}

/// Spawn the background sweep task.
pub fn spawn(directory: Arc<dyn DirectoryApi>, interval: Duration, grace_secs: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep_once(directory.as_ref(), grace_secs, Utc::now()).await {
                Ok(_) => {}
                Err(e) => warn!("sweep pass failed: {e}"),
            }
        }
    });
}
