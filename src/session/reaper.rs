//! Periodic eviction of idle sessions.
//!
//! # Responsibilities
//! - Sweep the session manager on a fixed interval
//! - Stop promptly when the owner cancels
//!
//! The session registry never evicts on its own; this task is the
//! optional external driver for it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::session::manager::SessionManager;

pub struct SessionReaper {
    manager: Arc<SessionManager>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(manager: Arc<SessionManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Build a reaper using the manager's configured sweep interval.
    pub fn from_settings(manager: Arc<SessionManager>) -> Self {
        let interval = manager.settings().reap_interval();
        Self::new(manager, interval)
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Session reaper starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.manager.cleanup_expired();
                    if !evicted.is_empty() {
                        tracing::debug!(evicted = evicted.len(), "Reaper sweep");
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Session reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
