//! # Core Domain Entities
//!
//! Defines the logistics entities shared across services.
//!
//! ## Clusters
//!
//! - **Identity**: `ShipmentId`, `CarrierId`, `RouteId`
//! - **Lifecycle**: `ShipmentStatus`
//! - **Derived State**: `TrackingSnapshot` (the cache-resident projection of
//!   one shipment's latest known state)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Unique identifier for a shipment.
///
/// Stored as an opaque string: production ids are UUIDs, but nothing in the
/// system depends on that shape, and external ingestion may carry foreign ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipmentId(pub String);

impl ShipmentId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShipmentId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarrierId(pub String);

impl CarrierId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CarrierId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub String);

impl RouteId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RouteId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CLUSTER B: LIFECYCLE
// =============================================================================

/// The shipment lifecycle states.
///
/// Carrier assignment moves a shipment straight to `InTransit`; there is no
/// intermediate "assigned" state on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Created, awaiting carrier assignment.
    Pending,
    /// Assigned to a carrier and moving.
    InTransit,
    /// Delivered to its destination. Terminal.
    Delivered,
}

impl ShipmentStatus {
    /// The wire representation (`pending`, `in_transit`, `delivered`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CLUSTER C: DERIVED STATE
// =============================================================================

/// The cache-resident projection of one shipment's latest known state.
///
/// Built exclusively from the fields of a single lifecycle event, so applying
/// the same event twice writes the same snapshot (replace, never merge). That
/// property is what makes redelivered events harmless to the tracking cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    /// The shipment this snapshot describes.
    pub shipment_id: ShipmentId,
    /// Latest lifecycle status.
    pub status: ShipmentStatus,
    /// Assigned carrier, once known.
    pub carrier_id: Option<CarrierId>,
    /// Assigned route, once known.
    pub route_id: Option<RouteId>,
    /// When the originating event occurred.
    pub updated_at: DateTime<Utc>,
}
