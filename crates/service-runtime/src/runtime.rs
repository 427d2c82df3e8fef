//! Runtime wiring for one mesh node.
//!
//! Startup order is part of the contract: the bus and cache come up first,
//! the dead letter and invalidation consumers bind their queues next, and
//! only then does the gateway start accepting connections. An event
//! published through a node can therefore never race an unbound queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use fm_coordinator::InvalidationCoordinator;
use fm_fanout::FanoutHub;
use fm_gateway::FixedWindowLimiter;
use shared_bus::{
    Broker, BusConnection, EventHandler, HandlerError, SubscriberHandle, DLQ_TOPIC,
};
use shared_cache::{CacheClient, MemoryStore};
use shared_types::{topics, EventEnvelope};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::MeshConfig;

/// Queue that drains [`DLQ_TOPIC`] so parked events are recorded.
const DEAD_LETTER_QUEUE: &str = "dead-letters";

/// How long shutdown waits for in-flight requests before tearing the
/// server down. Open websockets do not drain on their own.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One wired mesh node: bus, cache, invalidation coordinator, and gateway.
///
/// The `freightmesh` binary drives this; embedders can construct it
/// directly and publish through [`MeshRuntime::connection`].
pub struct MeshRuntime {
    connection: Arc<BusConnection>,
    cache: CacheClient,
    hub: Arc<FanoutHub>,
    addr: SocketAddr,
    consumers: Vec<SubscriberHandle>,
    sweeper: JoinHandle<()>,
    server: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl MeshRuntime {
    /// Wire every subsystem and start serving.
    pub async fn start(config: MeshConfig) -> Result<Self> {
        let broker = Arc::new(Broker::with_retry_policy(config.bus.retry()));
        let connection = BusConnection::new(Arc::clone(&broker), config.bus.connection());
        info!(username = %config.bus.username, "bus link configured");

        for topic in [
            topics::SHIPMENT_CREATED,
            topics::SHIPMENT_ASSIGNED,
            topics::SHIPMENT_DELIVERED,
        ] {
            connection
                .declare_topic(topic, true)
                .await
                .with_context(|| format!("declare topic {topic}"))?;
        }

        let store = Arc::new(MemoryStore::new());
        let sweeper = store.spawn_sweeper(config.cache.sweep_interval);
        let cache = CacheClient::new(store, config.cache.op_timeout);

        let hub = Arc::new(FanoutHub::default());

        let mut consumers = Vec::new();

        let dead_letters = connection
            .subscribe(DEAD_LETTER_QUEUE, DLQ_TOPIC, Arc::new(DeadLetterLog))
            .await
            .context("bind dead letter queue")?;
        consumers.push(dead_letters);

        let coordinator = Arc::new(
            InvalidationCoordinator::new(cache.clone(), Arc::clone(&hub))
                .with_tracking_ttl(config.cache.default_ttl),
        );
        let invalidation = coordinator
            .attach(&connection)
            .await
            .context("bind invalidation queue")?;
        consumers.push(invalidation);

        let limiter = Arc::new(
            FixedWindowLimiter::new(cache.clone(), config.gateway.rate_limit.policy())
                .with_failure_policy(config.gateway.rate_limit.failure_policy()),
        );
        let app = fm_gateway::router(Arc::clone(&hub), limiter);

        let listener = TcpListener::bind(config.gateway.bind_addr)
            .await
            .with_context(|| format!("bind {}", config.gateway.bind_addr))?;
        let addr = listener.local_addr().context("resolve gateway address")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, app, shutdown_rx));

        info!(%addr, "mesh node is up");
        Ok(Self {
            connection,
            cache,
            hub,
            addr,
            consumers,
            sweeper,
            server,
            shutdown_tx,
        })
    }

    /// Socket the gateway is actually bound to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for publishing onto the mesh bus.
    #[must_use]
    pub fn connection(&self) -> &Arc<BusConnection> {
        &self.connection
    }

    /// Shared cache handle.
    #[must_use]
    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    /// Live subscription registry behind the gateway.
    #[must_use]
    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    /// Stop serving, drain the consumers, and stop the sweeper.
    pub async fn shutdown(mut self) {
        info!("mesh node shutting down");
        let _ = self.shutdown_tx.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server)
            .await
            .is_err()
        {
            self.server.abort();
        }
        for consumer in self.consumers {
            consumer.shutdown().await;
        }
        self.sweeper.abort();
        info!("mesh node stopped");
    }
}

async fn serve(listener: TcpListener, app: Router, mut shutdown_rx: watch::Receiver<bool>) {
    // Connect info feeds the rate limiter's client key fallback.
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = axum::serve(listener, service).with_graceful_shutdown(async move {
        // A closed channel counts as shutdown too.
        let _ = shutdown_rx.changed().await;
    });
    if let Err(error) = server.await {
        error!(%error, "gateway server exited");
    }
}

/// Terminal consumer for parked deliveries. Recording them loudly is the
/// whole job; replay stays a manual operation.
struct DeadLetterLog;

#[async_trait]
impl EventHandler for DeadLetterLog {
    async fn handle(&self, envelope: EventEnvelope) -> Result<(), HandlerError> {
        error!(
            event_id = %envelope.event_id,
            payload = %envelope.payload,
            "event parked on the dead letter queue"
        );
        Ok(())
    }
}
