//! Per-user request window.

use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request is within quota. `count` is the number of requests
    /// accepted in the current window, including this one.
    Allowed { count: u32 },
    /// The quota for the current window is spent.
    Denied {
        /// Time left until the window rolls over
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// A rolling request window for a single user.
///
/// Windows are reset lazily: a request arriving `window` or more after
/// `window_start` opens a fresh window. Denied requests neither count nor
/// move the window.
#[derive(Debug, Clone)]
pub struct RateWindow {
    /// When the current window started
    window_start: Instant,
    /// Accepted requests since `window_start`
    count: u32,
}

impl RateWindow {
    /// Create an empty window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Try to take one unit of quota at `now`.
    pub fn admit(&mut self, now: Instant, limit: u32, window: Duration) -> Admission {
        self.maybe_reset_window(now, window);

        if self.count >= limit {
            return Admission::Denied {
                retry_after: self.duration_until_reset(now, window),
            };
        }

        self.count += 1;
        Admission::Allowed { count: self.count }
    }

    /// Accepted requests in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start of the current window.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Time left until the window can be reset.
    pub fn duration_until_reset(&self, now: Instant, window: Duration) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        window.saturating_sub(elapsed)
    }

    fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
    }
}
