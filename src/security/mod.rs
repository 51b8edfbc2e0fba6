pub mod rate_limiting;

pub use rate_limiting::{Clock, RateLimitStatus, RateLimiter, SystemClock};
