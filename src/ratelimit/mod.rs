//! Rate limiting algorithms and state management.

mod backend;
mod clock;
mod fixed_window;
mod key;
mod store;
mod sweeper;
mod token_bucket;

pub use backend::{build_limiter, Decision, DenialCause, RateLimiter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fixed_window::{FixedWindowLimiter, WindowLog};
pub use key::{KeyDeriver, RateLimitKey};
pub use store::RateLimitStore;
pub use sweeper::spawn_sweeper;
pub use token_bucket::{Bucket, TokenBucketLimiter};
