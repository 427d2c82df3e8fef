//! The in-process broker: topic registry, queue routing, redelivery, and
//! dead-letter parking.
//!
//! One `Broker` plays the role a message broker process plays in a
//! distributed deployment; every service in the process talks to it through
//! its own [`crate::connection::BusConnection`]. A networked adapter would
//! replace this type and nothing above it.

use dashmap::DashMap;
use serde_json::json;
use shared_types::EventEnvelope;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::queue::{DeliveryTag, DurableQueue};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::topic::{validate_topic_name, TopicPattern};
use crate::DLQ_TOPIC;

#[derive(Debug, Clone, Copy)]
struct TopicMeta {
    durable: bool,
}

/// In-memory message broker.
pub struct Broker {
    topics: DashMap<String, TopicMeta>,
    queues: DashMap<String, Arc<DurableQueue>>,
    retry: RetryPolicy,
    events_published: AtomicU64,
}

impl Broker {
    /// Create a broker with the default retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy::default())
    }

    /// Create a broker with an explicit retry policy.
    #[must_use]
    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        let broker = Self {
            topics: DashMap::new(),
            queues: DashMap::new(),
            retry,
            events_published: AtomicU64::new(0),
        };
        // The dead letter topic always exists; parking must never fail on
        // topology grounds.
        broker.topics.insert(
            DLQ_TOPIC.to_owned(),
            TopicMeta { durable: true },
        );
        broker
    }

    /// Declare a topic. Idempotent for identical declarations; declaring an
    /// existing topic with a different durability flag is a topology error.
    pub fn declare_topic(&self, name: &str, durable: bool) -> Result<(), BusError> {
        validate_topic_name(name)?;
        match self.topics.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if existing.get().durable == durable {
                    Ok(())
                } else {
                    Err(BusError::TopicRedeclared {
                        name: name.to_owned(),
                        existing: existing.get().durable,
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(TopicMeta { durable });
                debug!(topic = name, durable, "topic declared");
                Ok(())
            }
        }
    }

    /// Bind a durable queue to a pattern, creating it if needed. Idempotent
    /// for identical bindings.
    pub(crate) fn bind_queue(
        &self,
        name: &str,
        pattern: &str,
    ) -> Result<Arc<DurableQueue>, BusError> {
        let parsed = TopicPattern::parse(pattern)?;
        match self.queues.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if existing.get().pattern() == &parsed {
                    Ok(Arc::clone(existing.get()))
                } else {
                    Err(BusError::QueueRebound {
                        name: name.to_owned(),
                        existing: existing.get().pattern().as_str().to_owned(),
                    })
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let queue = Arc::new(DurableQueue::new(name.to_owned(), parsed));
                vacant.insert(Arc::clone(&queue));
                debug!(queue = name, pattern, "queue bound");
                Ok(queue)
            }
        }
    }

    /// Route an envelope into every queue whose pattern matches its topic.
    ///
    /// Returns the number of queues that accepted a copy. Zero receivers
    /// means the event is gone; acceptance by the broker never implies a
    /// consumer will process it.
    pub(crate) fn publish_routed(&self, envelope: EventEnvelope) -> Result<usize, BusError> {
        if !self.topics.contains_key(&envelope.topic) {
            return Err(BusError::UnknownTopic(envelope.topic.clone()));
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let mut receivers = 0;
        for queue in self.queues.iter() {
            if queue.pattern().matches(&envelope.topic) {
                queue.enqueue(envelope.clone(), 1);
                receivers += 1;
            }
        }

        if receivers == 0 {
            debug!(
                topic = %envelope.topic,
                event_id = %envelope.event_id,
                "event dropped (no queues bound)"
            );
        } else {
            debug!(
                topic = %envelope.topic,
                event_id = %envelope.event_id,
                receivers,
                "event routed"
            );
        }
        Ok(receivers)
    }

    /// Settle a successful delivery.
    pub(crate) fn settle_ack(&self, queue: &DurableQueue, tag: DeliveryTag) {
        if !queue.ack(tag) {
            debug!(
                queue = queue.name(),
                tag, "late ack ignored (delivery was requeued)"
            );
        }
    }

    /// Settle a failed delivery: redeliver after backoff, or park on the
    /// dead letter topic once attempts are exhausted.
    pub(crate) fn settle_nack(self: &Arc<Self>, queue: &Arc<DurableQueue>, tag: DeliveryTag) {
        let Some(pending) = queue.reject(tag) else {
            debug!(
                queue = queue.name(),
                tag, "late nack ignored (delivery was requeued)"
            );
            return;
        };

        match self.retry.decide(pending.attempt) {
            RetryDecision::Retry { delay } => {
                debug!(
                    queue = queue.name(),
                    event_id = %pending.envelope.event_id,
                    attempt = pending.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "delivery nacked, redelivery scheduled"
                );
                let queue = Arc::clone(queue);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.enqueue(pending.envelope, pending.attempt + 1);
                });
            }
            RetryDecision::GiveUp => {
                self.park_to_dlq(queue.name(), &pending.envelope, pending.attempt);
            }
        }
    }

    fn park_to_dlq(&self, queue_name: &str, envelope: &EventEnvelope, attempts: u32) {
        warn!(
            queue = queue_name,
            topic = %envelope.topic,
            event_id = %envelope.event_id,
            attempts,
            "delivery attempts exhausted, parking on dead letter topic"
        );
        let parked = EventEnvelope::new(
            DLQ_TOPIC,
            json!({
                "originalTopic": envelope.topic,
                "eventId": envelope.event_id,
                "queue": queue_name,
                "attempts": attempts,
                "payload": envelope.payload,
            }),
        );
        match self.publish_routed(parked) {
            Ok(0) => warn!(
                topic = %envelope.topic,
                event_id = %envelope.event_id,
                "dead letter dropped (no dlq queue bound)"
            ),
            Ok(_) => {}
            Err(error) => warn!(%error, "dead letter publish failed"),
        }
    }

    /// Total envelopes accepted for routing since construction.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// (ready, in flight) depths of a queue, if it exists.
    #[must_use]
    pub fn queue_depths(&self, name: &str) -> Option<(usize, usize)> {
        self.queues.get(name).map(|queue| queue.depths())
    }

    /// Every queue currently bound. Used by connections to requeue
    /// in-flight deliveries when the link drops.
    pub(crate) fn queues(&self) -> Vec<Arc<DurableQueue>> {
        self.queues
            .iter()
            .map(|queue| Arc::clone(queue.value()))
            .collect()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
