//! Session expiry and eviction
//!
//! The sweeper finalizes sessions nobody is waiting on anymore and evicts
//! terminal sessions once they are older than the retention window.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};

use crate::store::SessionStore;

/// Statistics about a sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Active sessions past their deadline, now TimedOut
    pub expired: usize,
    /// Terminal sessions removed from the store
    pub evicted: usize,
    /// Duration of the sweep in milliseconds
    pub duration_ms: u64,
}

/// Run one sweep at `now`
///
/// Expires first, then evicts, so a session expired in this pass is only
/// evicted once it is also older than `retention`.
pub fn sweep(store: &SessionStore, now: Instant, retention: Duration) -> SweepStats {
    let start = std::time::Instant::now();

    let expired = store.expire_stale(now);
    let evicted = store.evict_terminal(now, retention);

    let stats = SweepStats {
        expired,
        evicted,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if stats.expired > 0 {
        tracing::info!("Marked {} sessions as timed out", stats.expired);
    }
    if stats.evicted > 0 {
        tracing::info!("Cleaned up {} old sessions", stats.evicted);
    }

    stats
}

/// Handle for the background sweeper task
pub struct SweeperTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweeperTask {
    /// Signal the sweeper to stop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!("Sweeper task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn a background sweeper that runs every `interval`
///
/// Returns a SweeperTask handle that can be used to shutdown the task gracefully.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    retention: Duration,
) -> SweeperTask {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        tracing::info!(
            "Starting session sweeper (interval: {}s, retention: {}s)",
            interval.as_secs(),
            retention.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Session sweeper shutting down");
                    break;
                }
                _ = sleep(interval) => {
                    let stats = sweep(&store, Instant::now(), retention);
                    tracing::debug!(
                        "Sweep cycle: {} expired, {} evicted in {}ms",
                        stats.expired,
                        stats.evicted,
                        stats.duration_ms
                    );
                }
            }
        }
    });

    SweeperTask {
        shutdown_tx,
        handle,
    }
}
