//! WebSocket bridge between live clients and the fan-out hub.
//!
//! Clients manage interest with text frames:
//! `{"action":"subscribe","shipmentId":"S1"}` and the matching
//! `"unsubscribe"`. Outbound frames carry fan-out updates as JSON.
//! Malformed input gets an error frame; the connection survives it.

use axum::extract::ws::{Message, WebSocket};
use fm_fanout::{ConnectionId, FanoutHub};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared_types::ShipmentId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client -> server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    Subscribe { shipment_id: ShipmentId },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { shipment_id: ShipmentId },
}

/// Drive one accepted socket until either side closes it.
///
/// The task owns the connection's registry entry: it registers on entry
/// and removes itself before returning, so `notify` never routes to a
/// socket that stopped reading.
pub async fn handle_socket(socket: WebSocket, hub: Arc<FanoutHub>) {
    let (connection_id, mut updates) = hub.register();
    info!(connection_id = %connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                let frame = match serde_json::to_string(&update) {
                    Ok(frame) => frame,
                    Err(error) => {
                        warn!(connection_id = %connection_id, %error, "dropping unserializable update");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(result) = incoming else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = apply_command(&hub, connection_id, &text) {
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        // Tolerate JSON sent as a binary frame
                        let reply = match String::from_utf8(data) {
                            Ok(text) => apply_command(&hub, connection_id, &text),
                            Err(_) => Some(error_frame("binary frame is not utf-8")),
                        };
                        if let Some(reply) = reply {
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        debug!(connection_id = %connection_id, "close frame received");
                        break;
                    }
                    Err(error) => {
                        warn!(connection_id = %connection_id, %error, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(connection_id);
    info!(connection_id = %connection_id, "websocket closed");
}

/// Apply one client frame against the registry.
///
/// Returns a frame to send back when the input was rejected, `None` when
/// it was applied silently.
fn apply_command(hub: &FanoutHub, connection_id: ConnectionId, text: &str) -> Option<String> {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(error) => {
            debug!(connection_id = %connection_id, %error, "malformed client frame");
            return Some(error_frame(&format!("malformed frame: {error}")));
        }
    };

    match command {
        ClientCommand::Subscribe { shipment_id } => {
            match hub.subscribe(&shipment_id, connection_id) {
                Ok(()) => {
                    debug!(
                        connection_id = %connection_id,
                        shipment_id = %shipment_id,
                        "client subscribed"
                    );
                    None
                }
                Err(error) => Some(error_frame(&error.to_string())),
            }
        }
        ClientCommand::Unsubscribe { shipment_id } => {
            hub.unsubscribe(&shipment_id, connection_id);
            None
        }
    }
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
