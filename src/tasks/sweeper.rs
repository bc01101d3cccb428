//! Expiry Sweeper Task
//!
//! Background task that periodically purges expired cache entries.

use std::hash::Hash;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::event::{submit_structural, Event, SharedLock, StructuralOp};

/// Handle to a running sweeper.
#[derive(Debug)]
pub(crate) struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits until it has.
    ///
    /// A sweep already in progress completes first.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(%err, "expiry sweeper ended abnormally");
        }
    }
}

/// Spawns a background task that purges expired entries every `interval`.
///
/// Each sweep takes the write lock and waits for the purge to be applied
/// before releasing it. The task exits when stopped through the returned
/// handle, when the handle is dropped, or when the event queue is closed.
pub(crate) fn spawn_expiry_sweeper<K, V>(
    state: SharedLock<K, V>,
    events: mpsc::Sender<Event<K, V>>,
    interval: Duration,
) -> SweeperHandle
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let (stop, mut stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "starting expiry sweeper"
        );

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let guard = state.write().await;
            let before = guard.index.len();
            let guard = match submit_structural(&events, StructuralOp::RemoveExpired, guard).await {
                Ok(guard) => guard,
                Err(err) => {
                    warn!(%err, "expiry sweep failed, stopping sweeper");
                    break;
                }
            };
            let removed = before - guard.index.len();
            drop(guard);

            if removed > 0 {
                info!(removed, "expiry sweep removed expired entries");
            } else {
                debug!("expiry sweep found no expired entries");
            }
        }

        info!("expiry sweeper stopped");
    });

    SweeperHandle { stop, task }
}
