//! Consumer loops and the handler seam.
//!
//! One consumer task drains one durable queue. Every delivery is run in its
//! own spawned task so a panicking handler is contained and counted as a
//! failure; the loop itself only exits on shutdown.

use async_trait::async_trait;
use shared_types::EventEnvelope;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::broker::Broker;
use crate::connection::{BusConnection, ConnectionState};
use crate::error::HandlerError;
use crate::queue::DurableQueue;

/// Consumer seam: one implementation per subscribing service.
///
/// Handlers MUST be idempotent. Delivery is at least once: the same
/// envelope can arrive again after a nack, a panic, or a connection drop,
/// and the net effect must equal a single application.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one delivery. `Ok` acknowledges it; `Err` requests
    /// redelivery.
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        (self.0)(envelope).await
    }
}

/// Handle to a running consumer loop.
///
/// Dropping the handle aborts the loop; [`SubscriberHandle::shutdown`]
/// stops it gracefully after the in-progress delivery settles.
pub struct SubscriberHandle {
    queue_name: String,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// The durable queue this consumer drains.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        let _ = (&mut self.task).await;
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn spawn_consumer(
    connection: Arc<BusConnection>,
    broker: Arc<Broker>,
    queue: Arc<DurableQueue>,
    handler: Arc<dyn EventHandler>,
) -> SubscriberHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let queue_name = queue.name().to_owned();
    let task = tokio::spawn(consumer_loop(connection, broker, queue, handler, shutdown_rx));
    SubscriberHandle {
        queue_name,
        shutdown_tx,
        task,
    }
}

async fn consumer_loop(
    connection: Arc<BusConnection>,
    broker: Arc<Broker>,
    queue: Arc<DurableQueue>,
    handler: Arc<dyn EventHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut state_rx = connection.watch_state();
    debug!(queue = queue.name(), "consumer loop started");

    loop {
        let stop = *shutdown_rx.borrow_and_update();
        if stop {
            break;
        }

        let state = *state_rx.borrow_and_update();
        if state != ConnectionState::Ready {
            // Self-heal: try to bring the link back; if it is down, pause
            // until something changes rather than spinning.
            if connection.ensure_ready().await.is_err() {
                tokio::select! {
                    _ = state_rx.changed() => {}
                    _ = shutdown_rx.changed() => {}
                    () = tokio::time::sleep(connection.reconnect_delay()) => {}
                }
            }
            continue;
        }

        let Some((tag, pending)) = queue.take() else {
            tokio::select! {
                () = queue.notified() => {}
                _ = state_rx.changed() => {}
                _ = shutdown_rx.changed() => {}
            }
            continue;
        };

        let envelope = pending.envelope;
        let attempt = pending.attempt;
        let event_id = envelope.event_id;
        let topic = envelope.topic.clone();

        let isolated = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.handle(envelope).await })
        };

        match isolated.await {
            Ok(Ok(())) => {
                broker.settle_ack(&queue, tag);
                debug!(
                    queue = queue.name(),
                    %event_id,
                    topic = %topic,
                    attempt,
                    "delivery acknowledged"
                );
            }
            Ok(Err(handler_error)) => {
                warn!(
                    queue = queue.name(),
                    %event_id,
                    topic = %topic,
                    attempt,
                    error = %handler_error,
                    "handler failed, delivery nacked"
                );
                broker.settle_nack(&queue, tag);
            }
            Err(join_error) => {
                error!(
                    queue = queue.name(),
                    %event_id,
                    topic = %topic,
                    attempt,
                    panicked = join_error.is_panic(),
                    "handler aborted, delivery nacked"
                );
                broker.settle_nack(&queue, tag);
            }
        }
    }

    debug!(queue = queue.name(), "consumer loop stopped");
}
