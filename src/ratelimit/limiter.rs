//! Core rate limiter implementation.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::client::ClientId;
use super::clock::{Clock, SystemClock};
use super::window::{Decision, SlidingWindow};
use crate::config::RateLimitingConfig;

/// The sliding-window rate limiter that owns the visit log.
///
/// This struct is thread-safe and can be shared across multiple tasks. Each
/// client's prune-check-append sequence runs while holding that client's
/// map entry, so concurrent requests from one client can never admit more
/// than `max_requests` within a window.
pub struct RateLimiter {
    /// Admitted request timestamps indexed by client
    visits: DashMap<ClientId, SlidingWindow>,
    /// Maximum admitted requests per window
    max_requests: usize,
    /// Window length in seconds
    window_secs: f64,
    /// Source of the current time for `check`
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter driven by the system clock.
    pub fn new(config: &RateLimitingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter driven by the given clock.
    pub fn with_clock(config: &RateLimitingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            visits: DashMap::new(),
            max_requests: config.max_requests,
            window_secs: config.time_window_secs as f64,
            clock,
        }
    }

    /// Decide whether a request from `client` arriving at `now` is admitted.
    ///
    /// Stale timestamps are pruned first. A rejected request is not recorded
    /// and so does not extend the client's time at the limit.
    pub fn decide(&self, client: &ClientId, now: f64) -> Decision {
        let (decision, count) = {
            let mut window = self.visits.entry(client.clone()).or_insert_with(|| {
                debug!(client = %client, "Tracking new client");
                SlidingWindow::new()
            });

            let decision = window.try_admit(now, self.window_secs, self.max_requests);
            (decision, window.len())
        };

        match decision {
            Decision::Allow => trace!(
                client = %client,
                count = count,
                limit = self.max_requests,
                "Request admitted"
            ),
            Decision::Reject => debug!(
                client = %client,
                count = count,
                limit = self.max_requests,
                "Rate limit exceeded"
            ),
        }

        decision
    }

    /// Decide using the limiter's own clock.
    pub fn check(&self, client: &ClientId) -> Decision {
        self.decide(client, self.clock.now())
    }

    /// Current time according to the limiter's clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Prune every client against `now` and drop those left with no history.
    ///
    /// Returns the number of clients removed.
    pub fn sweep(&self, now: f64) -> usize {
        let window_secs = self.window_secs;
        let mut removed = 0;

        self.visits.retain(|_, window| {
            window.prune(now, window_secs);
            let keep = !window.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Number of stored timestamps for a client, as of its last access.
    ///
    /// Returns `None` if the client has never been seen (or was swept).
    pub fn visit_count(&self, client: &ClientId) -> Option<usize> {
        self.visits.get(client).map(|window| window.len())
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.visits.len()
    }

    /// Forget all clients.
    pub fn clear(&self) {
        self.visits.clear();
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitingConfig::default())
    }
}
