//! Door identifiers, door states and per-door pin bindings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::PinId;

/// Error returned when a door name is not recognized
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown door: {0}")]
pub struct DoorIdError(pub String);

/// One of the two physical garage doors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorId {
    Left,
    Right,
}

impl DoorId {
    /// Both doors, left first
    pub const ALL: [DoorId; 2] = [DoorId::Left, DoorId::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            DoorId::Left => "Left",
            DoorId::Right => "Right",
        }
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoorId {
    type Err = DoorIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(DoorId::Left),
            "right" => Ok(DoorId::Right),
            _ => Err(DoorIdError(s.to_string())),
        }
    }
}

/// Canonical state of a door
///
/// Always derived from sensor readings or sensor edges, never stored.
/// `Error` exists for clients that already understand it, but no sensor
/// combination currently produces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorState {
    Open,
    Closed,
    Moving,
    #[default]
    Unknown,
    Error,
}

impl DoorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Open => "Open",
            DoorState::Closed => "Closed",
            DoorState::Moving => "Moving",
            DoorState::Unknown => "Unknown",
            DoorState::Error => "Error",
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of a door's two position sensors a pin is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorRole {
    /// Asserted while the door is fully open
    Open,
    /// Asserted while the door is fully closed
    Closed,
}

impl SensorRole {
    /// State the door has reached when this sensor becomes asserted
    pub fn arrived_state(&self) -> DoorState {
        match self {
            SensorRole::Open => DoorState::Open,
            SensorRole::Closed => DoorState::Closed,
        }
    }
}

impl fmt::Display for SensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorRole::Open => f.write_str("open"),
            SensorRole::Closed => f.write_str("closed"),
        }
    }
}

/// Pin bindings for one door, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorPins {
    /// Output pin pulsing the motor relay
    pub actuator: PinId,
    /// Input pin of the open position sensor
    pub open_sensor: PinId,
    /// Input pin of the closed position sensor
    pub closed_sensor: PinId,
}

impl DoorPins {
    /// The pin wired to the given sensor
    pub fn sensor(&self, role: SensorRole) -> PinId {
        match role {
            SensorRole::Open => self.open_sensor,
            SensorRole::Closed => self.closed_sensor,
        }
    }

    /// Sensor pins with their roles, open first
    pub fn sensors(&self) -> [(SensorRole, PinId); 2] {
        [
            (SensorRole::Open, self.open_sensor),
            (SensorRole::Closed, self.closed_sensor),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_door_id_parse_is_case_insensitive() {
        assert_eq!("left".parse::<DoorId>().unwrap(), DoorId::Left);
        assert_eq!("Right".parse::<DoorId>().unwrap(), DoorId::Right);
        assert_eq!(
            "middle".parse::<DoorId>(),
            Err(DoorIdError("middle".to_string()))
        );
    }

    #[test]
    fn test_door_state_serializes_as_name() {
        assert_eq!(serde_json::to_string(&DoorState::Moving).unwrap(), "\"Moving\"");
        assert_eq!(DoorState::default(), DoorState::Unknown);
    }

    #[test]
    fn test_sensor_lookup() {
        let pins = DoorPins {
            actuator: PinId(17),
            open_sensor: PinId(22),
            closed_sensor: PinId(27),
        };
        assert_eq!(pins.sensor(SensorRole::Open), PinId(22));
        assert_eq!(pins.sensor(SensorRole::Closed), PinId(27));
        assert_eq!(SensorRole::Closed.arrived_state(), DoorState::Closed);
    }
}
