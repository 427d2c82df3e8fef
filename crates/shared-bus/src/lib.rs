//! # Shared Bus - Durable Event Bus for Inter-Service Communication
//!
//! Services never call each other directly: every cross-service signal is an
//! [`EventEnvelope`](shared_types::EventEnvelope) published to a topic here.
//!
//! ## Choreography Pattern
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Service A   │                    │  Service B   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │    Broker    │          │
//!                  │ topic router │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Delivery Contract
//!
//! - **Topic routing:** dot-delimited names, queue patterns may use `*`
//!   (one segment) and a trailing `#` (any remainder)
//! - **At least once:** deliveries stay in flight until acked; a nack, a
//!   handler panic or a dropped connection puts them back on the queue
//! - **Dead Letter Queue:** events that exhaust their retry budget are
//!   parked on [`DLQ_TOPIC`] with their delivery history

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod connection;
pub mod error;
mod queue;
pub mod retry;
pub mod subscriber;
pub mod topic;

// Re-export main types
pub use broker::Broker;
pub use connection::{BusConnection, ConnectionConfig, ConnectionState, EventPublisher};
pub use error::{BusError, HandlerError};
pub use retry::{RetryDecision, RetryPolicy};
pub use subscriber::{EventHandler, FnHandler, SubscriberHandle};
pub use topic::{validate_topic_name, TopicPattern, TopicPatternError};

/// Dead Letter Queue topic for events that exhausted redelivery.
pub const DLQ_TOPIC: &str = "dlq.events";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlq_topic_is_a_valid_topic_name() {
        assert!(validate_topic_name(DLQ_TOPIC).is_ok());
    }
}
