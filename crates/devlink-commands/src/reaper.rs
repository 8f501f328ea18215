//! Background reaping of finished commands.
//!
//! [`CommandQueue::list`] already reaps lazily; the reaper covers hosts
//! that rarely list, so terminal commands do not pile up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::queue::CommandQueue;

/// Periodic sweep of a [`CommandQueue`].
pub struct CommandReaper {
    queue: Arc<CommandQueue>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl CommandReaper {
    pub fn new(queue: Arc<CommandQueue>, interval: Duration) -> Self {
        Self {
            queue,
            interval,
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the sweep task. Does nothing if already running.
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let queue = self.queue.clone();
        let shutdown = self.shutdown.clone();
        // tokio intervals must be non-zero
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.notified() => break,
                }

                let reaped = queue.reap_expired();
                if reaped > 0 {
                    debug!(category = "reaper", reaped, "Reaped finished commands");
                }
            }
        });

        *self.task_handle.write().await = Some(handle);
        info!(category = "reaper", interval_ms = period.as_millis() as u64, "Command reaper started");
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        self.shutdown.notify_one();
        let mut task = self.task_handle.write().await;
        if let Some(handle) = task.take() {
            drop(task);
            handle.await.ok();
        }
        info!(category = "reaper", "Command reaper stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
