//! Durable queue internals.
//!
//! A queue owns two sets: envelopes ready for delivery (FIFO) and envelopes
//! in flight, keyed by delivery tag, each owned by exactly one consumer
//! until acked or nacked. Durability here means queue contents survive
//! consumer and connection failures within the broker's lifetime; they are
//! not persisted across broker restarts.

use parking_lot::Mutex;
use shared_types::EventEnvelope;
use std::collections::{HashMap, VecDeque};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::topic::TopicPattern;

pub(crate) type DeliveryTag = u64;

/// An envelope waiting for (re)delivery, with its attempt counter.
#[derive(Debug, Clone)]
pub(crate) struct PendingDelivery {
    pub envelope: EventEnvelope,
    /// Which delivery attempt the next handoff will be, 1-based.
    pub attempt: u32,
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: VecDeque<PendingDelivery>,
    in_flight: HashMap<DeliveryTag, PendingDelivery>,
    next_tag: DeliveryTag,
}

#[derive(Debug)]
pub(crate) struct DurableQueue {
    name: String,
    pattern: TopicPattern,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl DurableQueue {
    pub(crate) fn new(name: String, pattern: TopicPattern) -> Self {
        Self {
            name,
            pattern,
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Append an envelope for a given attempt and wake the consumer.
    pub(crate) fn enqueue(&self, envelope: EventEnvelope, attempt: u32) {
        self.inner
            .lock()
            .ready
            .push_back(PendingDelivery { envelope, attempt });
        self.notify.notify_one();
    }

    /// Hand the oldest ready envelope to a consumer, moving it in flight.
    pub(crate) fn take(&self) -> Option<(DeliveryTag, PendingDelivery)> {
        let mut inner = self.inner.lock();
        let pending = inner.ready.pop_front()?;
        let tag = inner.next_tag;
        inner.next_tag += 1;
        inner.in_flight.insert(tag, pending.clone());
        Some((tag, pending))
    }

    /// Settle a delivery permanently. Returns false if the tag is no longer
    /// in flight (the entry was requeued by a connection drop and this ack
    /// arrived late).
    pub(crate) fn ack(&self, tag: DeliveryTag) -> bool {
        self.inner.lock().in_flight.remove(&tag).is_some()
    }

    /// Take a delivery back out of the in-flight set after a handler
    /// failure. The caller decides between redelivery and dead-lettering.
    pub(crate) fn reject(&self, tag: DeliveryTag) -> Option<PendingDelivery> {
        self.inner.lock().in_flight.remove(&tag)
    }

    /// Return every in-flight delivery to the ready set. Called when the
    /// owning connection drops: the consumer that held these deliveries is
    /// gone, and they must be delivered again.
    pub(crate) fn requeue_in_flight(&self) -> usize {
        let mut inner = self.inner.lock();
        let requeued = inner.in_flight.len();
        let orphaned: Vec<PendingDelivery> = inner.in_flight.drain().map(|(_, p)| p).collect();
        inner.ready.extend(orphaned);
        if requeued > 0 {
            self.notify.notify_one();
        }
        requeued
    }

    /// Resolves once new envelopes may be ready.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// (ready, in flight) depths.
    pub(crate) fn depths(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.ready.len(), inner.in_flight.len())
    }
}
