//! # Shipment Lifecycle Events
//!
//! The closed set of events that producers publish and consumers decode.
//! One topic maps to exactly one payload shape; anything else is a decode
//! error surfaced at the subscription boundary.
//!
//! Payload field names follow the platform's wire convention (camelCase),
//! while the envelope around them stays in the crate's native casing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::entities::{CarrierId, RouteId, ShipmentId, ShipmentStatus, TrackingSnapshot};
use crate::envelope::EventEnvelope;

/// Topic names for the shipment lifecycle.
pub mod topics {
    /// A shipment was created. Payload: `{shipmentId, status}`.
    pub const SHIPMENT_CREATED: &str = "shipment.created";
    /// A carrier was assigned. Payload: `{shipmentId, carrierId, routeId, status}`.
    pub const SHIPMENT_ASSIGNED: &str = "shipment.assigned";
    /// A shipment reached its destination. Payload: `{shipmentId, status}`.
    pub const SHIPMENT_DELIVERED: &str = "shipment.delivered";
    /// Wildcard pattern matching all of the above.
    pub const SHIPMENT_LIFECYCLE: &str = "shipment.*";
}

/// All events in the shipment lifecycle.
///
/// Every variant corresponds to one topic in [`topics`]; the mapping both
/// ways is total, so a subscriber holding a decoded event always knows which
/// topic carried it and a producer never has to spell topic strings at call
/// sites.
#[derive(Debug, Clone, PartialEq)]
pub enum ShipmentEvent {
    /// A shipment entered the system.
    Created {
        shipment_id: ShipmentId,
        status: ShipmentStatus,
    },
    /// A carrier and route were assigned; the shipment is now moving.
    Assigned {
        shipment_id: ShipmentId,
        carrier_id: CarrierId,
        route_id: RouteId,
        status: ShipmentStatus,
    },
    /// The shipment reached its destination.
    Delivered {
        shipment_id: ShipmentId,
        status: ShipmentStatus,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedWire {
    shipment_id: ShipmentId,
    status: ShipmentStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignedWire {
    shipment_id: ShipmentId,
    carrier_id: CarrierId,
    route_id: RouteId,
    status: ShipmentStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveredWire {
    shipment_id: ShipmentId,
    status: ShipmentStatus,
}

impl ShipmentEvent {
    /// The topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Created { .. } => topics::SHIPMENT_CREATED,
            Self::Assigned { .. } => topics::SHIPMENT_ASSIGNED,
            Self::Delivered { .. } => topics::SHIPMENT_DELIVERED,
        }
    }

    /// The shipment this event concerns.
    #[must_use]
    pub fn shipment_id(&self) -> &ShipmentId {
        match self {
            Self::Created { shipment_id, .. }
            | Self::Assigned { shipment_id, .. }
            | Self::Delivered { shipment_id, .. } => shipment_id,
        }
    }

    /// The lifecycle status the event carries.
    #[must_use]
    pub fn status(&self) -> ShipmentStatus {
        match self {
            Self::Created { status, .. }
            | Self::Assigned { status, .. }
            | Self::Delivered { status, .. } => *status,
        }
    }

    /// The wire payload for this event (producer contract).
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Created {
                shipment_id,
                status,
            } => json!({
                "shipmentId": shipment_id,
                "status": status,
            }),
            Self::Assigned {
                shipment_id,
                carrier_id,
                route_id,
                status,
            } => json!({
                "shipmentId": shipment_id,
                "carrierId": carrier_id,
                "routeId": route_id,
                "status": status,
            }),
            Self::Delivered {
                shipment_id,
                status,
            } => json!({
                "shipmentId": shipment_id,
                "status": status,
            }),
        }
    }

    /// Wrap this event for publication, stamped with the current time.
    #[must_use]
    pub fn into_envelope(self) -> EventEnvelope {
        let topic = self.topic();
        EventEnvelope::new(topic, self.payload())
    }

    /// Wrap this event with an explicit occurrence time.
    #[must_use]
    pub fn into_envelope_at(self, occurred_at: DateTime<Utc>) -> EventEnvelope {
        let topic = self.topic();
        EventEnvelope::with_timestamp(topic, self.payload(), occurred_at)
    }

    /// Decode an envelope back into a typed event.
    ///
    /// This is the consumer-side boundary check: an unknown topic or a
    /// payload that does not match its topic's shape fails here, before any
    /// handler logic runs. Extra payload fields are tolerated for forward
    /// compatibility; missing or mistyped fields are not.
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, EventDecodeError> {
        let payload = |source| EventDecodeError::Payload {
            topic: envelope.topic.clone(),
            source,
        };
        match envelope.topic.as_str() {
            topics::SHIPMENT_CREATED => {
                let wire: CreatedWire =
                    serde_json::from_value(envelope.payload.clone()).map_err(payload)?;
                Ok(Self::Created {
                    shipment_id: wire.shipment_id,
                    status: wire.status,
                })
            }
            topics::SHIPMENT_ASSIGNED => {
                let wire: AssignedWire =
                    serde_json::from_value(envelope.payload.clone()).map_err(payload)?;
                Ok(Self::Assigned {
                    shipment_id: wire.shipment_id,
                    carrier_id: wire.carrier_id,
                    route_id: wire.route_id,
                    status: wire.status,
                })
            }
            topics::SHIPMENT_DELIVERED => {
                let wire: DeliveredWire =
                    serde_json::from_value(envelope.payload.clone()).map_err(payload)?;
                Ok(Self::Delivered {
                    shipment_id: wire.shipment_id,
                    status: wire.status,
                })
            }
            other => Err(EventDecodeError::UnknownTopic(other.to_owned())),
        }
    }

    /// Project this event into the tracking snapshot it implies.
    ///
    /// The snapshot holds exactly the fields the event carried. A
    /// `Delivered` event, which names no carrier, therefore yields a
    /// snapshot with no carrier; consumers wanting history consult the
    /// source of truth, not the cache.
    #[must_use]
    pub fn snapshot(&self, occurred_at: DateTime<Utc>) -> TrackingSnapshot {
        match self {
            Self::Created {
                shipment_id,
                status,
            }
            | Self::Delivered {
                shipment_id,
                status,
            } => TrackingSnapshot {
                shipment_id: shipment_id.clone(),
                status: *status,
                carrier_id: None,
                route_id: None,
                updated_at: occurred_at,
            },
            Self::Assigned {
                shipment_id,
                carrier_id,
                route_id,
                status,
            } => TrackingSnapshot {
                shipment_id: shipment_id.clone(),
                status: *status,
                carrier_id: Some(carrier_id.clone()),
                route_id: Some(route_id.clone()),
                updated_at: occurred_at,
            },
        }
    }
}

/// Why an envelope could not be decoded into a [`ShipmentEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The topic is not part of the shipment lifecycle set.
    #[error("unknown event topic `{0}`")]
    UnknownTopic(String),

    /// The payload does not match the shape its topic promises.
    #[error("payload does not match the `{topic}` contract")]
    Payload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}
