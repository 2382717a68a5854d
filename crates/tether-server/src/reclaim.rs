//! Periodic reclamation of empty session groups.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::SessionRegistry;

/// Spawn a task that calls [`SessionRegistry::reclaim`] every `interval`
/// until `cancel` fires. The first pass runs one interval after spawning.
pub fn spawn_reclaim_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reclaimed = registry.reclaim().await;
                    if reclaimed > 0 {
                        info!(reclaimed, remaining = registry.group_count(), "reclaimed empty session groups");
                    } else {
                        debug!(groups = registry.group_count(), "reclaim pass found nothing");
                    }
                }
            }
        }
        debug!("reclaim task stopped");
    })
}
