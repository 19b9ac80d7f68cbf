//! WebSocket message types

use chrono::{DateTime, Utc};
use garage_core::{DoorId, DoorState, NotificationFact, GARAGE_STATE_EVENT};
use serde::{Deserialize, Serialize};

/// Incoming WebSocket message from a client
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Ask the server to re-broadcast both doors' state
    #[serde(rename = "getState")]
    GetState,
}

/// Outgoing WebSocket message
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    GarageState(GarageStateEvent),
    GarageSnapshot(GarageSnapshotEvent),
}

/// One door changed state
#[derive(Debug, Serialize)]
pub struct GarageStateEvent {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub door: DoorId,
    pub state: DoorState,
    pub timestamp: DateTime<Utc>,
}

impl From<NotificationFact> for GarageStateEvent {
    fn from(fact: NotificationFact) -> Self {
        Self {
            msg_type: GARAGE_STATE_EVENT,
            door: fact.door,
            state: fact.state,
            timestamp: fact.timestamp,
        }
    }
}

/// `[left, right]` state sent when a client connects
#[derive(Debug, Serialize)]
pub struct GarageSnapshotEvent {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub state: [DoorState; 2],
    pub timestamp: DateTime<Utc>,
}

impl GarageSnapshotEvent {
    pub fn new(state: [DoorState; 2]) -> Self {
        Self {
            msg_type: GARAGE_STATE_EVENT,
            state,
            timestamp: Utc::now(),
        }
    }
}
