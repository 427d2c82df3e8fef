//! Middleware stack for the gateway.
//!
//! Layer order: Request → Trace → RateLimit → Handler

pub mod rate_limit;

pub use rate_limit::{RateLimitLayer, RateLimitService, SubjectId};
