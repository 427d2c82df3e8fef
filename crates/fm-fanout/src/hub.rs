//! Shipment-to-connection routing registry.
//!
//! The hub owns two indexes: shipment -> subscribed connections (forward,
//! used by `notify`) and connection -> subscribed shipments (reverse, used
//! by `disconnect`). Both are updated synchronously so a closed socket
//! never leaves dangling membership behind.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::ShipmentId;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

/// Identifier for one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One update pushed to a subscribed connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutMessage {
    /// The shipment this update is about.
    pub shipment_id: ShipmentId,
    /// Update body, forwarded to the client verbatim.
    pub payload: serde_json::Value,
}

/// Subscription error
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("unknown connection")]
    UnknownConnection,
    #[error("too many subscriptions for this connection")]
    TooManySubscriptions,
}

/// Fan-out hub shared by the event side (notify) and the socket side
/// (register/subscribe/disconnect).
pub struct FanoutHub {
    /// Outbound channel per live connection
    connections: DashMap<ConnectionId, mpsc::Sender<FanoutMessage>>,
    /// Shipment -> connections subscribed to it
    subscribers: DashMap<ShipmentId, HashSet<ConnectionId>>,
    /// Connection -> shipments it subscribes to
    by_connection: DashMap<ConnectionId, HashSet<ShipmentId>>,
    /// Buffered updates per connection before drops kick in
    channel_capacity: usize,
    /// Max shipments one connection may subscribe to
    max_subscriptions_per_connection: usize,
}

impl FanoutHub {
    #[must_use]
    pub fn new(channel_capacity: usize, max_subscriptions_per_connection: usize) -> Self {
        Self {
            connections: DashMap::new(),
            subscribers: DashMap::new(),
            by_connection: DashMap::new(),
            channel_capacity,
            max_subscriptions_per_connection,
        }
    }

    /// Register a new connection.
    ///
    /// Returns its ID and the receiving half the socket task drains.
    #[must_use]
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<FanoutMessage>) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.connections.insert(connection_id, tx);

        debug!(connection_id = %connection_id, "connection registered");
        (connection_id, rx)
    }

    /// Subscribe a connection to a shipment.
    ///
    /// Idempotent: subscribing twice is a no-op.
    pub fn subscribe(
        &self,
        shipment_id: &ShipmentId,
        connection_id: ConnectionId,
    ) -> Result<(), SubscribeError> {
        if !self.connections.contains_key(&connection_id) {
            return Err(SubscribeError::UnknownConnection);
        }

        let newly = {
            let mut subscribed = self.by_connection.entry(connection_id).or_default();
            if subscribed.len() >= self.max_subscriptions_per_connection
                && !subscribed.contains(shipment_id)
            {
                return Err(SubscribeError::TooManySubscriptions);
            }
            subscribed.insert(shipment_id.clone())
        };

        if newly {
            self.subscribers
                .entry(shipment_id.clone())
                .or_default()
                .insert(connection_id);

            debug!(
                connection_id = %connection_id,
                shipment_id = %shipment_id,
                "subscription added"
            );
        }
        Ok(())
    }

    /// Unsubscribe a connection from a shipment. Returns whether the
    /// subscription existed.
    pub fn unsubscribe(&self, shipment_id: &ShipmentId, connection_id: ConnectionId) -> bool {
        let existed = self
            .by_connection
            .get_mut(&connection_id)
            .is_some_and(|mut subscribed| subscribed.remove(shipment_id));

        if existed {
            self.remove_subscriber(shipment_id, connection_id);
            debug!(
                connection_id = %connection_id,
                shipment_id = %shipment_id,
                "subscription removed"
            );
        }
        existed
    }

    /// Drop a connection and every subscription it holds.
    ///
    /// Runs inline with the socket close so `notify` never routes to a
    /// connection that is already gone.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);

        if let Some((_, subscribed)) = self.by_connection.remove(&connection_id) {
            for shipment_id in &subscribed {
                self.remove_subscriber(shipment_id, connection_id);
            }
            debug!(
                connection_id = %connection_id,
                subscriptions = subscribed.len(),
                "connection disconnected"
            );
        }
    }

    /// Push an update to every connection subscribed to the shipment.
    ///
    /// Best effort: a full or closed channel drops the message for that
    /// connection (clients re-fetch on reconnect). Returns how many
    /// connections received it.
    pub fn notify(&self, shipment_id: &ShipmentId, payload: serde_json::Value) -> usize {
        let subscribed: Vec<ConnectionId> = match self.subscribers.get(shipment_id) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let message = FanoutMessage {
            shipment_id: shipment_id.clone(),
            payload,
        };

        let mut delivered = 0;
        for connection_id in subscribed {
            let Some(tx) = self.connections.get(&connection_id) else {
                continue;
            };
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(
                        connection_id = %connection_id,
                        shipment_id = %shipment_id,
                        "update dropped, connection buffer full"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        connection_id = %connection_id,
                        shipment_id = %shipment_id,
                        "update dropped, connection gone"
                    );
                }
            }
        }

        debug!(
            shipment_id = %shipment_id,
            delivered,
            "update fanned out"
        );
        delivered
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of shipments with at least one subscriber.
    #[must_use]
    pub fn subscribed_shipment_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of connections subscribed to one shipment.
    #[must_use]
    pub fn subscriber_count(&self, shipment_id: &ShipmentId) -> usize {
        self.subscribers
            .get(shipment_id)
            .map_or(0, |set| set.len())
    }

    fn remove_subscriber(&self, shipment_id: &ShipmentId, connection_id: ConnectionId) {
        if let Some(mut set) = self.subscribers.get_mut(shipment_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                drop(set);
                self.subscribers
                    .remove_if(shipment_id, |_, set| set.is_empty());
            }
        }
    }
}
