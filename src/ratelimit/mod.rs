//! Rate Limiter (C3)
//!
//! Two independent layers: a per-connection token bucket gating
//! inbound message acceptance, and a per-(principal, room) sliding-window
//! chat counter. Both are O(1) per call and reset lazily — no timer thread,
//! no I/O.

mod chat_window;
mod token_bucket;

pub use chat_window::ChatWindowLimiter;
pub use token_bucket::TokenBucket;
