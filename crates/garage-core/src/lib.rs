//! Core types for the garage door controller
//!
//! This crate provides the fundamental types shared by every other crate:
//! door identifiers and states, pin levels and edges, the notification fact
//! that is fanned out to subscribers, and the pure state evaluation.

mod door;
mod engine;
mod error;
mod fact;
mod pin;

pub use door::{DoorId, DoorIdError, DoorPins, DoorState, SensorRole};
pub use engine::evaluate;
pub use error::{HardwareError, NotificationError};
pub use fact::NotificationFact;
pub use pin::{Edge, Level, PinEdge, PinId};

/// Event name used for door state pushes on the WebSocket channel
pub const GARAGE_STATE_EVENT: &str = "garageState";

/// Message type a WebSocket client sends to request a fresh state push
pub const GET_STATE_REQUEST: &str = "getState";
