//! Adaptive rate limiting.
//!
//! # Data Flow
//! ```text
//! (source, user?, endpoint, method)
//!     → global bucket
//!     → per-source-IP bucket
//!     → per-user bucket (when a user id is present)
//!     → per-endpoint bucket (auth/login endpoints use the stricter tier)
//!     first tier over its limit rejects the request
//!
//! Maintenance:
//!     PeriodicTask → sweep_idle (drop buckets empty and untouched past the TTL)
//! ```
//!
//! # Design Decisions
//! - Sliding windows of timestamps, not token buckets: a window holds at
//!   most `max_requests` entries younger than `window`
//! - Consume-then-reject: slots taken by earlier tiers are kept when a later
//!   tier rejects
//! - Buckets live in a sharded map so unrelated keys never contend

pub mod bucket;
pub mod limiter;

pub use bucket::RateBucket;
pub use limiter::{is_auth_endpoint, RateLimitOutcome, RateLimitStats, RateLimiter, Scope, TierStatus};
