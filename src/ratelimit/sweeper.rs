//! Background eviction of idle clients.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Spawn a task that sweeps idle clients out of `limiter` every `interval`.
///
/// The task runs until it is aborted or the runtime shuts down.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting idle client sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep(limiter.now());
            debug!(
                removed = removed,
                remaining = limiter.client_count(),
                "Swept idle clients"
            );
        }
    })
}
