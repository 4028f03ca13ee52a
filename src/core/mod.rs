//! Core components
//!
//! The memory store and the request rate limiter, each constructed once at
//! startup and shared with request handlers.

mod memory;
mod rate_limit;

pub use memory::{DeleteOutcome, MemoryConfig, MemoryStore};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitStats, RateLimiter};
