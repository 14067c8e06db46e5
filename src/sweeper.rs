//! Presence Sweeper
//!
//! Background task that periodically evicts silent browsers. Each pass
//! runs in its own task so a panic is contained: the coordinator lock is
//! released on unwind, the failure is logged and the next tick retries.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::Coordinator;

/// Periodic eviction of stale browsers
pub struct Sweeper {
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper for `coordinator`
    pub fn new(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        Self { coordinator, interval }
    }

    /// Run the sweep loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Sweep every interval, forever
    pub async fn run(self) {
        tracing::info!("Presence sweeper started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Run one isolated sweep pass. Returns `None` if the pass failed.
    pub async fn tick(&self) -> Option<Vec<String>> {
        let coordinator = Arc::clone(&self.coordinator);

        match tokio::spawn(async move { coordinator.sweep().await }).await {
            Ok(evicted) => Some(evicted),
            Err(e) => {
                tracing::error!("Presence sweep failed, retrying next tick: {}", e);
                None
            }
        }
    }
}
