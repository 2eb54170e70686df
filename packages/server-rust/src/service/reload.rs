//! Periodic reload of the key-value snapshot.
//!
//! The refresh process rewrites the snapshot file out of band. The reloader
//! re-reads it on a fixed interval and whenever a [`ReloadTrigger`] fires.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::MemoryKeyValueStore;

/// Re-reads the snapshot file and swaps its tables into the store.
///
/// A failed reload keeps the previous tables and is retried on the next
/// tick.
pub struct SnapshotReloader {
    store: Arc<MemoryKeyValueStore>,
    path: PathBuf,
}

impl SnapshotReloader {
    #[must_use]
    pub fn new(store: Arc<MemoryKeyValueStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    /// Loads the snapshot once and returns the number of items read.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn reload(&self) -> anyhow::Result<usize> {
        self.store.load_snapshot_file(&self.path).await
    }

    /// Moves the reloader onto a background task that reloads every
    /// `interval` and on demand. The first reload happens one interval
    /// after spawning.
    #[must_use]
    pub fn spawn(self, interval: Duration) -> ReloaderHandle {
        let trigger = ReloadTrigger::default();
        let requested = Arc::clone(&trigger.notify);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            let mut reloads: u64 = 0;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticks.tick() => {}
                    () = requested.notified() => ticks.reset(),
                }
                match self.reload().await {
                    Ok(items) => {
                        reloads += 1;
                        tracing::debug!(
                            path = %self.path.display(),
                            items,
                            "key-value snapshot reloaded"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %format!("{e:#}"),
                            "key-value snapshot reload failed"
                        );
                    }
                }
            }

            tracing::debug!(reloads, "snapshot reloader stopped");
        });

        ReloaderHandle {
            trigger,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Requests an immediate reload. Cheap to clone.
#[derive(Clone, Default)]
pub struct ReloadTrigger {
    notify: Arc<Notify>,
}

impl ReloadTrigger {
    /// Requests made while a reload is running collapse into one more
    /// reload.
    pub fn reload_now(&self) {
        self.notify.notify_one();
    }
}

/// Owns the running reloader task.
pub struct ReloaderHandle {
    trigger: ReloadTrigger,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReloaderHandle {
    #[must_use]
    pub fn trigger(&self) -> ReloadTrigger {
        self.trigger.clone()
    }

    /// Stops the task, letting an in-progress reload finish first.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
