//! Per-user request quotas.

mod counter;
mod limiter;

pub use counter::{Admission, RateWindow};
pub use limiter::{LimitConfig, RateLimiter, REQUEST_LIMIT, WINDOW};
