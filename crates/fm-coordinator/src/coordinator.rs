//! Event-to-cache-mutation mapping.
//!
//! The coordinator receives every `shipment.*` event exactly because of
//! at-least-once delivery it may receive each one more than once. The whole
//! reaction is therefore built from idempotent steps: deletes, and one
//! replace-style write derived only from the event itself. Applying an
//! event twice leaves the cache in the same state as applying it once.

use async_trait::async_trait;
use fm_fanout::FanoutHub;
use shared_bus::{BusConnection, BusError, EventHandler, HandlerError, SubscriberHandle};
use shared_cache::{keys, CacheClient, DEFAULT_TTL_SECS};
use shared_types::{EventEnvelope, ShipmentEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Queue the coordinator drains. Durable so events published while the
/// coordinator is down are waiting when it returns.
pub const COORDINATOR_QUEUE: &str = "cache-invalidation";

/// Subscribes to the shipment lifecycle and keeps cached projections honest.
pub struct InvalidationCoordinator {
    cache: CacheClient,
    fanout: Arc<FanoutHub>,
    tracking_ttl: Duration,
}

impl InvalidationCoordinator {
    #[must_use]
    pub fn new(cache: CacheClient, fanout: Arc<FanoutHub>) -> Self {
        Self {
            cache,
            fanout,
            tracking_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }

    /// Override the TTL on tracking snapshots written by this coordinator.
    #[must_use]
    pub fn with_tracking_ttl(mut self, ttl: Duration) -> Self {
        self.tracking_ttl = ttl;
        self
    }

    /// Bind the coordinator's durable queue and start consuming.
    pub async fn attach(
        self: Arc<Self>,
        connection: &Arc<BusConnection>,
    ) -> Result<SubscriberHandle, BusError> {
        connection
            .subscribe(
                COORDINATOR_QUEUE,
                shared_types::events::topics::SHIPMENT_LIFECYCLE,
                self,
            )
            .await
    }

    /// React to one lifecycle event.
    ///
    /// Reaction order: aggregate eviction, entity eviction, tracking
    /// replace, then fan-out. Cache failures along the way are soft (the
    /// entry's TTL bounds staleness) and never fail the delivery; only a
    /// payload that cannot be decoded does, sending it down the nack path.
    pub async fn apply(&self, envelope: &EventEnvelope) -> Result<(), HandlerError> {
        let event = ShipmentEvent::decode(envelope)?;
        let shipment_id = event.shipment_id().clone();

        // Any shipment change makes that day's aggregates unverifiable,
        // so the whole day bucket goes. Aggregates are not incrementally
        // maintainable from a single event.
        let (day_start, day_end) = keys::day_bounds(envelope.occurred_at);
        self.evict(&keys::metrics(day_start, day_end)).await;
        self.evict(&keys::revenue_trend(day_start, day_end)).await;

        // The shipment's own projection recomputes from source on next read.
        self.evict(&keys::shipment(&shipment_id)).await;

        // Replace, never merge: the new tracking state is a function of the
        // event alone, so a redelivery writes the same bytes again.
        let snapshot = event.snapshot(envelope.occurred_at);
        if let Err(error) = self
            .cache
            .set_json(
                &keys::tracking(&shipment_id),
                &snapshot,
                Some(self.tracking_ttl),
            )
            .await
        {
            warn!(
                shipment_id = %shipment_id,
                %error,
                "tracking snapshot write failed, next read recomputes"
            );
        }

        let receivers = self.fanout.notify(&shipment_id, event.payload());

        debug!(
            event_id = %envelope.event_id,
            topic = %envelope.topic,
            shipment_id = %shipment_id,
            receivers,
            "event applied"
        );
        Ok(())
    }

    async fn evict(&self, key: &str) {
        if let Err(error) = self.cache.delete(key).await {
            warn!(key, %error, "cache eviction failed, entry expires by ttl");
        }
    }
}

#[async_trait]
impl EventHandler for InvalidationCoordinator {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        self.apply(&envelope).await
    }
}
