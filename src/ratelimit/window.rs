//! Per-client sliding window of request timestamps.

use std::collections::VecDeque;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The request is within the limit and has been recorded.
    Allow,
    /// The client is at its limit; nothing was recorded.
    Reject,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Timestamps of the admitted requests of one client.
///
/// Timestamps are appended in arrival order, but that order is not relied on:
/// pruning scans every stored timestamp, so out-of-order entries expire the
/// same way as the rest.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<f64>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp `t` for which `now - t >= window_secs`.
    pub fn prune(&mut self, now: f64, window_secs: f64) {
        self.timestamps.retain(|&t| now - t < window_secs);
    }

    /// Prune, then record `now` if fewer than `max_requests` remain.
    pub fn try_admit(&mut self, now: f64, window_secs: f64, max_requests: usize) -> Decision {
        self.prune(now, window_secs);

        if self.timestamps.len() >= max_requests {
            return Decision::Reject;
        }

        self.timestamps.push_back(now);
        Decision::Allow
    }

    /// Number of stored timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps are stored.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The oldest stored timestamp.
    #[cfg(test)]
    pub fn oldest(&self) -> Option<f64> {
        self.timestamps.iter().copied().reduce(f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_until_full() {
        let mut window = SlidingWindow::new();

        for t in 0..3 {
            assert_eq!(window.try_admit(t as f64, 60.0, 3), Decision::Allow);
        }
        assert_eq!(window.try_admit(3.0, 60.0, 3), Decision::Reject);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_reject_does_not_record() {
        let mut window = SlidingWindow::new();
        window.try_admit(0.0, 10.0, 1);

        for t in 1..5 {
            assert_eq!(window.try_admit(t as f64, 10.0, 1), Decision::Reject);
        }

        assert_eq!(window.len(), 1);
        assert_eq!(window.oldest(), Some(0.0));
    }

    #[test]
    fn test_prune_boundary_is_exclusive() {
        let mut window = SlidingWindow::new();
        window.try_admit(0.0, 60.0, 5);
        window.try_admit(1.0, 60.0, 5);

        // now - t == window is already outside
        window.prune(60.0, 60.0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.oldest(), Some(1.0));

        window.prune(61.0, 60.0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_prune_out_of_order_timestamps() {
        let mut window = SlidingWindow::new();
        window.try_admit(50.0, 60.0, 5);
        window.try_admit(5.0, 60.0, 5);

        window.prune(70.0, 60.0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.oldest(), Some(50.0));
    }

    #[test]
    fn test_decision_is_allowed() {
        assert!(Decision::Allow.is_allowed());
        assert!(!Decision::Reject.is_allowed());
    }
}
