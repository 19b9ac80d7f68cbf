//! Door state facts fanned out to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DoorId, DoorState};

/// A door state observation at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFact {
    pub door: DoorId,
    pub state: DoorState,
    pub timestamp: DateTime<Utc>,
}

impl NotificationFact {
    /// Create a fact stamped with the current time
    pub fn now(door: DoorId, state: DoorState) -> Self {
        Self {
            door,
            state,
            timestamp: Utc::now(),
        }
    }

    /// Body published to the door's MQTT topic: `{"state":"<DoorState>"}`
    pub fn mqtt_payload(&self) -> Vec<u8> {
        serde_json::json!({ "state": self.state }).to_string().into_bytes()
    }
}
