//! Process-wide relay state.

use crate::config::LimitsConfig;
use crate::ratelimit::{LimitConfig, RateLimiter};
use crate::session::{SessionPolicy, SessionStore};

/// Owns the rate limiter and the session store.
///
/// Built once per process and shared with the dispatcher behind an `Arc`.
#[derive(Default)]
pub struct RelayState {
    pub limiter: RateLimiter,
    pub sessions: SessionStore,
}

impl RelayState {
    /// State with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// State with limits taken from configuration.
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            limiter: RateLimiter::with_config(LimitConfig {
                limit: limits.request_limit,
                window: limits.window(),
            }),
            sessions: SessionStore::with_policy(SessionPolicy {
                max_turns: limits.max_turns,
                inactivity_timeout: limits.inactivity_timeout(),
            }),
        }
    }
}
