//! Admission control: per-identity sliding windows and the global token bucket.

pub mod sliding_window;
pub mod token_bucket;

pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;
