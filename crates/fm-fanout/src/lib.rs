//! # Fan-out Hub - Real-Time Shipment Updates
//!
//! Routes shipment status changes to the live client connections
//! subscribed to them. The event side calls [`FanoutHub::notify`] after
//! cache state has been settled; the socket side registers connections
//! and manages subscriptions.
//!
//! ```text
//!                       ┌─────────────┐   try_send    ┌────────────┐
//!  notify("S1", ...) ──▶│  FanoutHub  │ ─────────────▶│ connection │──▶ ws
//!                       │  S1 -> {c1} │               └────────────┘
//!                       └─────────────┘
//! ```
//!
//! Delivery is best effort by contract: a slow or vanished connection
//! loses updates rather than applying backpressure to the event path.
//! Clients recover by re-fetching current state on reconnect.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod hub;

// Re-export main types
pub use hub::{ConnectionId, FanoutHub, FanoutMessage, SubscribeError};

/// Buffered updates per connection before drops kick in.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Max shipments one connection may subscribe to.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 128;

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_SUBSCRIPTIONS)
    }
}
