//! # Shared Types Crate
//!
//! This crate contains the domain entities, the `EventEnvelope` wrapper, and
//! the closed set of shipment lifecycle events shared across services.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-service types are defined here.
//! - **Opaque Transport**: The bus carries [`EventEnvelope`] values and never
//!   inspects payloads; only consumers decode them, via
//!   [`events::ShipmentEvent::decode`].
//! - **Closed Event Set**: Payload shapes are fixed per topic. A payload that
//!   does not match its topic's shape is a decode error at the subscription
//!   boundary, never a partially-read value.

pub mod entities;
pub mod envelope;
pub mod events;

pub use entities::*;
pub use envelope::EventEnvelope;
pub use events::{topics, EventDecodeError, ShipmentEvent};
