//! Per-client rate limiting for the shortening endpoint.

mod client;
mod limiter;
mod window;

pub use client::{ClientIdentity, ClientKey, COUNTER_PREFIX};
pub use limiter::RateLimiter;
pub use window::{Admission, RateWindow};
