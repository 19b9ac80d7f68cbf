//! WebSocket connection handling
//!
//! A connection gets the live state of both doors on connect, then every
//! fact broadcast on the notification bus. A `getState` request triggers a
//! fresh broadcast to all connections.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use garage_core::{NotificationError, NotificationFact};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

use crate::AppState;

use super::types::{GarageSnapshotEvent, GarageStateEvent, IncomingMessage, OutgoingMessage};

type WsSender = SplitSink<WebSocket, Message>;

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = Ulid::new();
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no fact falls between the two
    let facts = state.bus.subscribe();
    info!(%connection, clients = state.bus.subscriber_count(), "WebSocket client connected");

    let snapshot = OutgoingMessage::GarageSnapshot(GarageSnapshotEvent::new(
        state.bus.read_garage_state(),
    ));
    if let Err(e) = send_message(&mut sender, &snapshot).await {
        error!(%connection, "Failed to send initial garage state: {}", e);
        return;
    }

    let send_task = tokio::spawn(forward_facts(connection, sender, facts));

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => handle_message(&state, connection, &text),
            Ok(Message::Close(_)) => {
                debug!(%connection, "WebSocket client sent close");
                break;
            }
            // axum answers pings itself
            Ok(Message::Ping(_)) => trace!(%connection, "WebSocket ping"),
            Ok(_) => {}
            Err(e) => {
                warn!(%connection, "WebSocket error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    info!(%connection, "WebSocket client disconnected");
}

fn handle_message(state: &AppState, connection: Ulid, text: &str) {
    match serde_json::from_str::<IncomingMessage>(text) {
        Ok(IncomingMessage::GetState) => {
            debug!(%connection, "Garage state requested");
            state.bus.notify_garage_states();
        }
        Err(e) => debug!(%connection, payload = text, error = %e, "Ignoring WebSocket message"),
    }
}

/// Push every broadcast fact to one client until it goes away
async fn forward_facts(
    connection: Ulid,
    mut sender: WsSender,
    mut facts: broadcast::Receiver<NotificationFact>,
) {
    loop {
        match facts.recv().await {
            Ok(fact) => {
                let msg = OutgoingMessage::GarageState(GarageStateEvent::from(fact));
                if let Err(e) = send_message(&mut sender, &msg).await {
                    debug!(%connection, door = %fact.door, "Stopped forwarding: {}", e);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(%connection, skipped, "WebSocket client lagging, skipped garage states");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Serialize and send one message
pub async fn send_message(
    sender: &mut WsSender,
    msg: &OutgoingMessage,
) -> Result<(), NotificationError> {
    let json =
        serde_json::to_string(msg).map_err(|e| NotificationError::WebSocket(e.to_string()))?;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| NotificationError::WebSocket(e.to_string()))
}
