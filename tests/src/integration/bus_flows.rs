//! # Bus Delivery Flows
//!
//! Delivery semantics through the broker, exercised the way services use
//! it: a durable queue bound with a wildcard, handlers that fail, links
//! that drop. The contract under test is at-least-once delivery with
//! redelivery on failure and dead-lettering on exhaustion.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use shared_bus::{
        Broker, BusConnection, BusError, ConnectionConfig, EventHandler, FnHandler,
        HandlerError, RetryPolicy, DLQ_TOPIC,
    };
    use shared_types::{
        topics, CarrierId, EventEnvelope, RouteId, ShipmentEvent, ShipmentId, ShipmentStatus,
    };

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    const RECV_DEADLINE: Duration = Duration::from_secs(2);

    /// Broker with redelivery fast enough for a test run: three attempts,
    /// millisecond backoff, no jitter.
    fn fast_bus() -> (Arc<Broker>, Arc<BusConnection>) {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        };
        let broker = Arc::new(Broker::with_retry_policy(retry));
        let connection = BusConnection::new(Arc::clone(&broker), ConnectionConfig::default());
        (broker, connection)
    }

    async fn declare_lifecycle_topics(connection: &Arc<BusConnection>) {
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
    }

    fn envelope_for(event: &ShipmentEvent) -> EventEnvelope {
        EventEnvelope::new(event.topic(), event.payload())
    }

    fn created(id: &str) -> EventEnvelope {
        envelope_for(&ShipmentEvent::Created {
            shipment_id: ShipmentId::from(id),
            status: ShipmentStatus::Pending,
        })
    }

    fn assigned(id: &str) -> EventEnvelope {
        envelope_for(&ShipmentEvent::Assigned {
            shipment_id: ShipmentId::from(id),
            carrier_id: CarrierId::from("C1"),
            route_id: RouteId::from("R1"),
            status: ShipmentStatus::InTransit,
        })
    }

    fn delivered(id: &str) -> EventEnvelope {
        envelope_for(&ShipmentEvent::Delivered {
            shipment_id: ShipmentId::from(id),
            status: ShipmentStatus::Delivered,
        })
    }

    /// Handler that forwards every delivery to an mpsc channel.
    fn recording_handler(
        tx: mpsc::UnboundedSender<EventEnvelope>,
    ) -> Arc<dyn EventHandler> {
        Arc::new(FnHandler(move |envelope: EventEnvelope| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(envelope);
                Ok(())
            }
        }))
    }

    // =========================================================================
    // DELIVERY SEMANTICS
    // =========================================================================

    #[tokio::test]
    async fn a_wildcard_queue_sees_every_lifecycle_topic() {
        let (_broker, connection) = fast_bus();
        declare_lifecycle_topics(&connection).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _audit = connection
            .subscribe("audit", topics::SHIPMENT_LIFECYCLE, recording_handler(tx))
            .await
            .expect("subscribe");

        for envelope in [created("S1"), assigned("S1"), delivered("S1")] {
            connection.publish(envelope).await.expect("publish");
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let envelope = timeout(RECV_DEADLINE, rx.recv())
                .await
                .expect("delivery within deadline")
                .expect("channel open");
            seen.push(envelope.topic);
        }
        assert_eq!(
            seen,
            vec![
                topics::SHIPMENT_CREATED.to_owned(),
                topics::SHIPMENT_ASSIGNED.to_owned(),
                topics::SHIPMENT_DELIVERED.to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn deliveries_retry_until_the_handler_succeeds() {
        let (_broker, connection) = fast_bus();
        declare_lifecycle_topics(&connection).await;

        let attempts = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = {
            let attempts = Arc::clone(&attempts);
            Arc::new(FnHandler(move |envelope: EventEnvelope| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let tx = tx.clone();
                async move {
                    if attempt < 3 {
                        return Err(HandlerError::new("transient failure"));
                    }
                    let _ = tx.send(envelope);
                    Ok(())
                }
            }))
        };
        let _consumer = connection
            .subscribe("flaky", topics::SHIPMENT_LIFECYCLE, handler)
            .await
            .expect("subscribe");

        let envelope = created("S-retry");
        let event_id = envelope.event_id;
        connection.publish(envelope).await.expect("publish");

        let settled = timeout(RECV_DEADLINE, rx.recv())
            .await
            .expect("delivery within deadline")
            .expect("channel open");
        assert_eq!(settled.event_id, event_id);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_deliveries_park_on_the_dead_letter_topic() {
        let (_broker, connection) = fast_bus();
        declare_lifecycle_topics(&connection).await;

        let (dead_tx, mut dead_rx) = mpsc::unbounded_channel();
        let _dlq = connection
            .subscribe("dead-letters", DLQ_TOPIC, recording_handler(dead_tx))
            .await
            .expect("subscribe dlq");

        let poisoned: Arc<dyn EventHandler> = Arc::new(FnHandler(|_: EventEnvelope| async {
            Err(HandlerError::new("always fails"))
        }));
        let _consumer = connection
            .subscribe("poisoned", topics::SHIPMENT_LIFECYCLE, poisoned)
            .await
            .expect("subscribe");

        let envelope = created("S-dead");
        let event_id = envelope.event_id;
        connection.publish(envelope).await.expect("publish");

        let parked = timeout(RECV_DEADLINE, dead_rx.recv())
            .await
            .expect("dead letter within deadline")
            .expect("channel open");
        assert_eq!(parked.topic, DLQ_TOPIC);
        assert_eq!(parked.payload["originalTopic"], topics::SHIPMENT_CREATED);
        assert_eq!(parked.payload["queue"], "poisoned");
        assert_eq!(parked.payload["attempts"], 3);
        assert_eq!(parked.payload["eventId"], event_id.to_string());
        assert_eq!(parked.payload["payload"]["shipmentId"], "S-dead");
    }

    // =========================================================================
    // LINK FAILURES
    // =========================================================================

    #[tokio::test]
    async fn publishing_while_offline_reports_unavailable_and_recovers() {
        let (_broker, connection) = fast_bus();
        declare_lifecycle_topics(&connection).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _audit = connection
            .subscribe("audit", topics::SHIPMENT_LIFECYCLE, recording_handler(tx))
            .await
            .expect("subscribe");

        connection.set_offline(true);
        let error = connection
            .publish(created("S-offline"))
            .await
            .expect_err("publish must fail while offline");
        assert!(matches!(error, BusError::Unavailable { .. }));

        connection.set_offline(false);
        connection
            .publish(created("S-recovered"))
            .await
            .expect("publish after recovery");

        let envelope = timeout(RECV_DEADLINE, rx.recv())
            .await
            .expect("delivery within deadline")
            .expect("channel open");
        assert_eq!(envelope.payload["shipmentId"], "S-recovered");
    }

    #[tokio::test]
    async fn a_severed_link_redelivers_the_in_flight_event() {
        let (_broker, connection) = fast_bus();
        declare_lifecycle_topics(&connection).await;

        // Records the delivery at the start of handling and then lingers,
        // so the test can sever the link while the delivery is unacked.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn EventHandler> = {
            let tx = tx.clone();
            Arc::new(FnHandler(move |envelope: EventEnvelope| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(envelope);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                }
            }))
        };
        let _consumer = connection
            .subscribe("slow", topics::SHIPMENT_LIFECYCLE, handler)
            .await
            .expect("subscribe");

        let envelope = created("S-inflight");
        let event_id = envelope.event_id;
        connection.publish(envelope).await.expect("publish");

        let first = timeout(RECV_DEADLINE, rx.recv())
            .await
            .expect("first delivery")
            .expect("channel open");
        assert_eq!(first.event_id, event_id);

        connection.sever();

        let second = timeout(RECV_DEADLINE, rx.recv())
            .await
            .expect("redelivery after reconnect")
            .expect("channel open");
        assert_eq!(second.event_id, event_id);
    }
}
