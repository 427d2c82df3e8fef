//! # Invalidation Choreography
//!
//! The full consistency path a lifecycle event takes through one node:
//!
//! ```text
//! [Producer] ──shipment.*──→ [Broker] ──→ [InvalidationCoordinator]
//!                                              │
//!                          ┌───────────────────┼──────────────────┐
//!                          ↓                   ↓                  ↓
//!                   evict aggregates    replace tracking     FanoutHub
//!                   evict shipment        snapshot               │
//!                                                                ↓
//!                                                        subscribed clients
//! ```
//!
//! Covers the happy path, snapshot replacement, redelivery idempotency,
//! and the dead letter path for payloads that cannot be decoded.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use fm_coordinator::{InvalidationCoordinator, COORDINATOR_QUEUE};
    use fm_fanout::{ConnectionId, FanoutHub, FanoutMessage};
    use shared_bus::{
        Broker, BusConnection, ConnectionConfig, FnHandler, RetryPolicy, SubscriberHandle,
        DLQ_TOPIC,
    };
    use shared_cache::{keys, CacheClient, MemoryStore};
    use shared_types::{
        topics, CarrierId, EventEnvelope, RouteId, ShipmentEvent, ShipmentId, ShipmentStatus,
        TrackingSnapshot,
    };

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const RECV_DEADLINE: Duration = Duration::from_secs(2);

    /// One fully wired node, minus the gateway: broker, cache, hub, and an
    /// attached coordinator. The handle keeps the consumer alive.
    async fn mesh() -> (
        Arc<BusConnection>,
        CacheClient,
        Arc<FanoutHub>,
        SubscriberHandle,
    ) {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        };
        let broker = Arc::new(Broker::with_retry_policy(retry));
        let connection = BusConnection::new(Arc::clone(&broker), ConnectionConfig::default());
        for topic in [
            topics::SHIPMENT_CREATED,
            topics::SHIPMENT_ASSIGNED,
            topics::SHIPMENT_DELIVERED,
        ] {
            connection
                .declare_topic(topic, true)
                .await
                .expect("declare topic");
        }

        let cache = CacheClient::with_default_timeout(Arc::new(MemoryStore::new()));
        let fanout = Arc::new(FanoutHub::default());
        let coordinator = Arc::new(InvalidationCoordinator::new(
            cache.clone(),
            Arc::clone(&fanout),
        ));
        let handle = coordinator
            .attach(&connection)
            .await
            .expect("attach coordinator");

        (connection, cache, fanout, handle)
    }

    fn envelope_for(event: &ShipmentEvent) -> EventEnvelope {
        EventEnvelope::new(event.topic(), event.payload())
    }

    fn watch_shipment(
        fanout: &FanoutHub,
        id: &ShipmentId,
    ) -> (ConnectionId, mpsc::Receiver<FanoutMessage>) {
        let (connection_id, rx) = fanout.register();
        fanout.subscribe(id, connection_id).expect("subscribe");
        (connection_id, rx)
    }

    // =========================================================================
    // HAPPY PATH
    // =========================================================================

    #[tokio::test]
    async fn a_created_event_refreshes_tracking_and_notifies_subscribers() {
        let (connection, cache, fanout, _coordinator) = mesh().await;

        let shipment_id = ShipmentId::from("S-e2e");
        let (_watcher, mut updates) = watch_shipment(&fanout, &shipment_id);

        let event = ShipmentEvent::Created {
            shipment_id: shipment_id.clone(),
            status: ShipmentStatus::Pending,
        };
        let envelope = envelope_for(&event);
        let occurred_at = envelope.occurred_at;

        // Seed stale projections the event must wipe out.
        let (day_start, day_end) = keys::day_bounds(occurred_at);
        let metrics_key = keys::metrics(day_start, day_end);
        let shipment_key = keys::shipment(&shipment_id);
        for key in [&metrics_key, &shipment_key] {
            cache
                .set(key, Bytes::from_static(b"stale"), None)
                .await
                .expect("seed cache");
        }

        connection.publish(envelope).await.expect("publish");

        let update = timeout(RECV_DEADLINE, updates.recv())
            .await
            .expect("fan-out within deadline")
            .expect("channel open");
        assert_eq!(update.shipment_id, shipment_id);
        assert_eq!(update.payload["status"], "pending");

        // Fan-out happens last, so by now the cache reactions are settled.
        assert_eq!(cache.get(&metrics_key).await.expect("get"), None);
        assert_eq!(cache.get(&shipment_key).await.expect("get"), None);

        let snapshot: TrackingSnapshot = cache
            .get_json(&keys::tracking(&shipment_id))
            .await
            .expect("get tracking")
            .expect("snapshot present");
        assert_eq!(snapshot.shipment_id, shipment_id);
        assert_eq!(snapshot.status, ShipmentStatus::Pending);
        assert_eq!(snapshot.carrier_id, None);
        assert_eq!(snapshot.updated_at, occurred_at);
    }

    #[tokio::test]
    async fn assignment_replaces_the_tracking_snapshot() {
        let (connection, cache, fanout, _coordinator) = mesh().await;

        let shipment_id = ShipmentId::from("S-assign");
        let (_watcher, mut updates) = watch_shipment(&fanout, &shipment_id);

        let created = ShipmentEvent::Created {
            shipment_id: shipment_id.clone(),
            status: ShipmentStatus::Pending,
        };
        let assigned = ShipmentEvent::Assigned {
            shipment_id: shipment_id.clone(),
            carrier_id: CarrierId::from("C7"),
            route_id: RouteId::from("R12"),
            status: ShipmentStatus::InTransit,
        };
        connection
            .publish(envelope_for(&created))
            .await
            .expect("publish created");
        connection
            .publish(envelope_for(&assigned))
            .await
            .expect("publish assigned");

        for _ in 0..2 {
            timeout(RECV_DEADLINE, updates.recv())
                .await
                .expect("fan-out within deadline")
                .expect("channel open");
        }

        let snapshot: TrackingSnapshot = cache
            .get_json(&keys::tracking(&shipment_id))
            .await
            .expect("get tracking")
            .expect("snapshot present");
        assert_eq!(snapshot.status, ShipmentStatus::InTransit);
        assert_eq!(snapshot.carrier_id, Some(CarrierId::from("C7")));
        assert_eq!(snapshot.route_id, Some(RouteId::from("R12")));
    }

    // =========================================================================
    // REDELIVERY AND POISON
    // =========================================================================

    #[tokio::test]
    async fn applying_the_same_envelope_twice_is_harmless() {
        let cache = CacheClient::with_default_timeout(Arc::new(MemoryStore::new()));
        let fanout = Arc::new(FanoutHub::default());
        let coordinator = InvalidationCoordinator::new(cache.clone(), Arc::clone(&fanout));

        let shipment_id = ShipmentId::from("S-dup");
        let envelope = envelope_for(&ShipmentEvent::Delivered {
            shipment_id: shipment_id.clone(),
            status: ShipmentStatus::Delivered,
        });

        coordinator.apply(&envelope).await.expect("first apply");
        let first: TrackingSnapshot = cache
            .get_json(&keys::tracking(&shipment_id))
            .await
            .expect("get tracking")
            .expect("snapshot present");

        coordinator.apply(&envelope).await.expect("second apply");
        let second: TrackingSnapshot = cache
            .get_json(&keys::tracking(&shipment_id))
            .await
            .expect("get tracking")
            .expect("snapshot present");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn an_undecodable_payload_is_dead_lettered() {
        let (connection, _cache, _fanout, _coordinator) = mesh().await;

        let (dead_tx, mut dead_rx) = mpsc::unbounded_channel();
        let _dlq = connection
            .subscribe(
                "dead-letters",
                DLQ_TOPIC,
                Arc::new(FnHandler(move |envelope: EventEnvelope| {
                    let dead_tx = dead_tx.clone();
                    async move {
                        let _ = dead_tx.send(envelope);
                        Ok(())
                    }
                })),
            )
            .await
            .expect("subscribe dlq");

        // Right topic, wrong shape: decoding fails on every attempt.
        let poison = EventEnvelope::new(topics::SHIPMENT_CREATED, json!({"garbage": true}));
        let event_id = poison.event_id;
        connection.publish(poison).await.expect("publish");

        let parked = timeout(RECV_DEADLINE, dead_rx.recv())
            .await
            .expect("dead letter within deadline")
            .expect("channel open");
        assert_eq!(parked.payload["originalTopic"], topics::SHIPMENT_CREATED);
        assert_eq!(parked.payload["queue"], COORDINATOR_QUEUE);
        assert_eq!(parked.payload["attempts"], 3);
        assert_eq!(parked.payload["eventId"], event_id.to_string());
    }
}
