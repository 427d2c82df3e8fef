//! # `EventEnvelope`
//!
//! The universal wrapper for every event that crosses the bus.
//!
//! ## Transport Properties
//!
//! - **Opaque Payload**: The bus routes on `topic` alone and never inspects
//!   `payload`; shape checking happens when a consumer decodes.
//! - **Correlation**: `event_id` is generated once at publish time and is
//!   stable across redeliveries, so log lines from retries of the same event
//!   can be joined.
//! - **Immutability**: Envelopes are cloned into each bound queue; no
//!   consumer ever observes another consumer's mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One event as carried by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identity of this event, stable across redeliveries.
    pub event_id: Uuid,
    /// Dot-delimited routing topic, e.g. `shipment.created`.
    pub topic: String,
    /// The producer's payload. Never inspected in transit.
    pub payload: Value,
    /// When the producing service observed the state change.
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wrap a payload for publication, stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self::with_timestamp(topic, payload, Utc::now())
    }

    /// Wrap a payload with an explicit occurrence time.
    ///
    /// Producers that batch or replay historical changes use this so that
    /// date-bucketed invalidation lands on the day the change happened, not
    /// the day it was published.
    #[must_use]
    pub fn with_timestamp(
        topic: impl Into<String>,
        payload: Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            occurred_at,
        }
    }
}
