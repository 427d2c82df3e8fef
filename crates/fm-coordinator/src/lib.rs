//! # Invalidation Coordinator - Event-Driven Cache Consistency
//!
//! Consumes the shipment lifecycle from the bus and maps every event to a
//! deterministic, idempotent cache mutation, then pushes the change to live
//! subscribers.
//!
//! ```text
//!   shipment.*           ┌──────────────────┐   delete/replace   ┌───────┐
//!  ────────────────────▶ │   Coordinator    │ ──────────────────▶│ cache │
//!   (durable queue)      │  decode, react   │                    └───────┘
//!                        └────────┬─────────┘
//!                                 │ notify
//!                                 ▼
//!                           ┌───────────┐
//!                           │  fan-out  │
//!                           └───────────┘
//! ```
//!
//! ## Design Principles
//!
//! - **Idempotent reactions**: redelivered events re-run the same deletes
//!   and the same replace-style write; the cache converges to one state.
//! - **Soft cache failure**: an unreachable cache degrades to TTL-bounded
//!   staleness, it never turns a delivery into a redelivery storm.
//! - **Decode at the boundary**: payload shape is checked before any
//!   reaction runs; mismatches nack the delivery and nothing else.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod coordinator;
pub mod read_through;

// Re-export main types
pub use coordinator::{InvalidationCoordinator, COORDINATOR_QUEUE};
pub use read_through::read_through;
