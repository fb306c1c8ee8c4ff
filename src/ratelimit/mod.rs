//! Rate limiting logic and state management.

mod clock;
mod entry;
mod limiter;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitEntry;
pub use limiter::{LimitConfig, RateLimitDecision, RateLimiter, DEFAULT_LIMIT, DEFAULT_WINDOW};
pub use store::{FileStateStore, MemoryStateStore, RateLimitStateStore, RateLimitStore};
