//! Rate limiting logic and state management.

mod client;
mod clock;
mod limiter;
mod sweeper;
mod window;

pub use client::{ClientId, FORWARDED_FOR_HEADER, UNKNOWN_CLIENT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use sweeper::spawn_sweeper;
pub use window::{Decision, SlidingWindow};
