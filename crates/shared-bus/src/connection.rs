//! Owned bus connection with an explicit lifecycle.
//!
//! Every service holds its own `BusConnection` and injects it into
//! publishers and subscribers at construction. The link is established
//! lazily on first use and re-established transparently after a drop, with
//! all recorded topics and queue bindings re-declared before the connection
//! reports `Ready` again.
//!
//! ```text
//!            first use / reconnect
//! Disconnected ────────────▶ Connecting ────────▶ Ready
//!       ▲                        │ link down        │ sever()
//!       └────────────────────────┴──────────────────┘
//! ```
//!
//! The in-process transport cannot drop on its own, so outages enter the
//! system through [`BusConnection::set_offline`] and
//! [`BusConnection::sever`]; a networked adapter would wire its socket
//! errors to the same transitions.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::EventEnvelope;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::error::BusError;
use crate::queue::DurableQueue;
use crate::subscriber::{spawn_consumer, EventHandler, SubscriberHandle};

/// Link state as observed by publishers and consumer loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link. The next use will attempt to connect.
    Disconnected,
    /// One task is establishing the link and re-declaring topology.
    Connecting,
    /// Link up, topology asserted.
    Ready,
}

/// Timeouts governing connection use.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a caller waits for an in-progress connect before reporting
    /// the bus unavailable.
    pub connect_timeout: Duration,
    /// Budget for one publish, including any lazy reconnect it triggers.
    pub publish_timeout: Duration,
    /// Pause between consumer-side reconnect attempts while the link is
    /// down.
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            publish_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
struct Declarations {
    topics: Vec<(String, bool)>,
    bindings: Vec<(String, String)>,
}

/// A service's handle to the broker.
pub struct BusConnection {
    broker: Arc<Broker>,
    config: ConnectionConfig,
    declarations: Mutex<Declarations>,
    attached_queues: Mutex<Vec<Arc<DurableQueue>>>,
    state_tx: watch::Sender<ConnectionState>,
    offline: AtomicBool,
}

impl BusConnection {
    /// Create a connection handle. No link is established until first use.
    #[must_use]
    pub fn new(broker: Arc<Broker>, config: ConnectionConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            broker,
            config,
            declarations: Mutex::new(Declarations::default()),
            attached_queues: Mutex::new(Vec::new()),
            state_tx,
            offline: AtomicBool::new(false),
        })
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch link state transitions. Consumer loops use this to pause
    /// during an outage and resume on `Ready`.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Force the link down or allow it back up. While offline, connect
    /// attempts fail and every use reports the bus unavailable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
        if offline {
            self.sever();
        }
    }

    /// Drop the link now. In-flight deliveries owned by this connection's
    /// consumers return to their queues for redelivery after reconnection.
    pub fn sever(&self) {
        let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
        if previous == ConnectionState::Disconnected {
            return;
        }
        let requeued: usize = self
            .attached_queues
            .lock()
            .iter()
            .map(|queue| queue.requeue_in_flight())
            .sum();
        warn!(requeued, "bus connection severed");
    }

    /// Declare a topic, establishing the link first if necessary. The
    /// declaration is recorded and re-asserted after every reconnect.
    pub async fn declare_topic(&self, name: &str, durable: bool) -> Result<(), BusError> {
        self.ensure_ready().await?;
        self.broker.declare_topic(name, durable)?;
        let mut declarations = self.declarations.lock();
        if !declarations
            .topics
            .iter()
            .any(|(existing, _)| existing == name)
        {
            declarations.topics.push((name.to_owned(), durable));
        }
        Ok(())
    }

    /// Bind a durable queue to `pattern` and start a consumer loop feeding
    /// `handler`. Each delivery is handled in isolation: success acks,
    /// failure or panic nacks, and the loop itself never exits on handler
    /// errors.
    pub async fn subscribe(
        self: &Arc<Self>,
        queue_name: &str,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriberHandle, BusError> {
        self.ensure_ready().await?;
        let queue = self.broker.bind_queue(queue_name, pattern)?;
        {
            let mut declarations = self.declarations.lock();
            if !declarations
                .bindings
                .iter()
                .any(|(existing, _)| existing == queue_name)
            {
                declarations
                    .bindings
                    .push((queue_name.to_owned(), pattern.to_owned()));
            }
        }
        self.attached_queues.lock().push(Arc::clone(&queue));
        Ok(spawn_consumer(
            Arc::clone(self),
            Arc::clone(&self.broker),
            queue,
            handler,
        ))
    }

    /// Publish an envelope, establishing the link first if necessary.
    ///
    /// Fails with [`BusError::Unavailable`] when the link cannot come up or
    /// the publish exceeds its budget. Nothing is queued on the caller's
    /// behalf in that case; retrying is the caller's decision.
    pub async fn publish(&self, envelope: EventEnvelope) -> Result<usize, BusError> {
        let budget = self.config.publish_timeout;
        let attempt = async {
            self.ensure_ready().await?;
            self.broker.publish_routed(envelope)
        };
        match tokio::time::timeout(budget, attempt).await {
            Ok(result) => result,
            Err(_) => Err(BusError::unavailable(format!(
                "publish exceeded {budget:?}"
            ))),
        }
    }

    /// Drive the state machine to `Ready`, connecting if this caller wins
    /// the race to do so, or waiting (bounded) for whoever did.
    pub(crate) async fn ensure_ready(&self) -> Result<(), BusError> {
        loop {
            let mut state_rx = self.state_tx.subscribe();
            // Copy the state out so no read guard is held across the arms
            // below; `send_if_modified` takes the write side of the same
            // lock.
            let current = *state_rx.borrow_and_update();
            match current {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Disconnected => {
                    let elected = self.state_tx.send_if_modified(|state| {
                        if *state == ConnectionState::Disconnected {
                            *state = ConnectionState::Connecting;
                            true
                        } else {
                            false
                        }
                    });
                    if elected {
                        return self.connect();
                    }
                }
                ConnectionState::Connecting => {
                    let waited =
                        tokio::time::timeout(self.config.connect_timeout, state_rx.changed())
                            .await;
                    match waited {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => {
                            return Err(BusError::unavailable(
                                "timed out waiting for bus connection",
                            ))
                        }
                    }
                }
            }
        }
    }

    /// Establish the link and re-assert recorded topology.
    fn connect(&self) -> Result<(), BusError> {
        if self.offline.load(Ordering::Acquire) {
            self.state_tx.send_replace(ConnectionState::Disconnected);
            return Err(BusError::unavailable("bus link is down"));
        }

        let declarations = self.declarations.lock();
        for (name, durable) in &declarations.topics {
            if let Err(error) = self.broker.declare_topic(name, *durable) {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(error);
            }
        }
        for (queue, pattern) in &declarations.bindings {
            if let Err(error) = self.broker.bind_queue(queue, pattern) {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return Err(error);
            }
        }
        drop(declarations);

        self.state_tx.send_replace(ConnectionState::Ready);
        debug!("bus connection ready");
        Ok(())
    }

    pub(crate) fn reconnect_delay(&self) -> Duration {
        self.config.reconnect_delay
    }
}

/// Publisher seam for services that emit events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one envelope; resolves once the broker accepted it, with the
    /// number of queues that took a copy.
    async fn publish(&self, envelope: EventEnvelope) -> Result<usize, BusError>;
}

#[async_trait]
impl EventPublisher for BusConnection {
    async fn publish(&self, envelope: EventEnvelope) -> Result<usize, BusError> {
        BusConnection::publish(self, envelope).await
    }
}
