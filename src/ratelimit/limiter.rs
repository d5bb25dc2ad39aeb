//! Core rate limiter implementation.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::counter::{Admission, RateWindow};
use crate::user::UserId;

/// Requests accepted per window.
pub const REQUEST_LIMIT: u32 = 3;
/// Length of a rate-limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in the time window
    pub limit: u32,
    /// Length of the time window
    pub window: Duration,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: REQUEST_LIMIT,
            window: WINDOW,
        }
    }
}

/// Per-user rate limiter.
///
/// Each user's window lives in its own map entry; an admission decision runs
/// entirely under that entry's lock, so concurrent messages from one user
/// cannot double-spend quota while other users are unaffected.
pub struct RateLimiter {
    /// Rate windows indexed by user
    windows: DashMap<UserId, RateWindow>,
    config: LimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with the default quota of 3 requests per minute.
    pub fn new() -> Self {
        Self::with_config(LimitConfig::default())
    }

    /// Create a new rate limiter with a custom quota.
    pub fn with_config(config: LimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Decide whether `user` may make a request at `now`.
    pub fn admit(&self, user: UserId, now: Instant) -> Admission {
        let mut window = self.windows.entry(user).or_insert_with(|| {
            debug!(user = %user, limit = self.config.limit, "Creating new rate window");
            RateWindow::new(now)
        });

        let decision = window.admit(now, self.config.limit, self.config.window);

        match decision {
            Admission::Allowed { count } => {
                trace!(user = %user, count, "Request admitted");
            }
            Admission::Denied { retry_after } => {
                debug!(user = %user, retry_after = ?retry_after, "Rate limit exceeded");
            }
        }

        decision
    }

    /// The visible request count for `user`, if they have a window.
    pub fn count(&self, user: UserId) -> Option<u32> {
        self.windows.get(&user).map(|w| w.count())
    }

    /// The configured quota.
    pub fn config(&self) -> LimitConfig {
        self.config
    }

    /// Number of users with a window.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
