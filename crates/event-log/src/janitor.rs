use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::memory::InMemoryEventLog;

/// Retention settings for the background janitor.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Events older than this are pruned. Must be longer than the longest
    /// expected order flow or replay will see a truncated history.
    pub retention: chrono::Duration,
    /// How often the sweep runs.
    pub interval: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(30),
            interval: Duration::from_secs(3600),
        }
    }
}

/// Handle to a running janitor task.
pub struct JanitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// Signals the janitor to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawns the retention janitor for `log`.
///
/// The first sweep runs immediately, then every `config.interval` until
/// [`JanitorHandle::shutdown`] is called.
pub fn spawn_janitor(log: InMemoryEventLog, config: JanitorConfig) -> JanitorHandle {
    let (shutdown, mut watcher) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - config.retention;
                    let removed = log.prune_older_than(cutoff).await;
                    if removed > 0 {
                        metrics::counter!("event_log_pruned_total").increment(removed as u64);
                        tracing::info!(removed, %cutoff, "pruned expired events");
                    } else {
                        tracing::debug!(%cutoff, "retention sweep found nothing to prune");
                    }
                }
                _ = watcher.changed() => {
                    if *watcher.borrow() {
                        tracing::debug!("janitor shutting down");
                        break;
                    }
                }
            }
        }
    });
    JanitorHandle { shutdown, task }
}
