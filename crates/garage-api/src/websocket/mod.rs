//! Garage state push channel
//!
//! - `types` - message definitions
//! - `connection` - per-client loop

mod connection;
mod types;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use crate::AppState;

pub use types::{GarageSnapshotEvent, GarageStateEvent, IncomingMessage, OutgoingMessage};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}
