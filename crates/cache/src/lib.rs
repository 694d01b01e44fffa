pub mod clock;
pub mod rate_limit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{parse_window, RateLimitConfig, RateLimiter};
