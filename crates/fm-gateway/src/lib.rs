//! # Gateway - Admission Control and Real-Time Bridge
//!
//! Entry-point surface of the mesh: a tower layer enforcing one request
//! budget per client across every gateway instance, and the WebSocket
//! endpoint bridging clients to the fan-out hub.
//!
//! ```text
//!             ┌────────────┐      ┌───────────────┐
//!  request ──▶│ RateLimit  │─────▶│ /ws  /healthz │
//!             └─────┬──────┘      └───────┬───────┘
//!                   │ CAS on             │ subscribe
//!                   │ rate-limit:<key>   ▼
//!             ┌─────▼──────┐      ┌───────────────┐
//!             │shared cache│      │  fan-out hub  │
//!             └────────────┘      └───────────────┘
//! ```
//!
//! The window counter lives in the shared cache, so adding gateway
//! instances never multiplies a client's budget. A cache outage resolves
//! to the configured failure policy instead of an error response.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod limiter;
pub mod middleware;
pub mod router;
pub mod ws;

// Re-export main types
pub use limiter::{
    Clock, Decision, FailurePolicy, FixedWindowLimiter, RateLimitPolicy, SystemClock,
};
pub use middleware::{RateLimitLayer, RateLimitService, SubjectId};
pub use router::{router, GatewayState};
