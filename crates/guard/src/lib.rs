//! Delivery protection primitives backed by the shared Redis store.
//!
//! Every mutation here is a single atomic Redis command (`SET NX EX`,
//! `INCR`) — never a read followed by a separate write, which would race
//! under concurrent workers.

pub mod idempotency;
pub mod ratelimit;
pub mod rules;

pub use idempotency::{Claim, IdempotencyGuard};
pub use ratelimit::RateLimiter;
pub use rules::RuleStore;
