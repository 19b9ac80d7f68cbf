//! Error types shared across the controller

use thiserror::Error;

use crate::PinId;

/// A pin operation failed in the hardware facade
///
/// Local to the operation that triggered it; never fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HardwareError {
    #[error("GPIO unavailable: {0}")]
    Unavailable(String),

    #[error("failed to set up pin {pin}: {reason}")]
    Setup { pin: PinId, reason: String },

    #[error("failed to read pin {pin}: {reason}")]
    Read { pin: PinId, reason: String },

    #[error("failed to write pin {pin}: {reason}")]
    Write { pin: PinId, reason: String },

    #[error("failed to register interrupt on pin {pin}: {reason}")]
    Interrupt { pin: PinId, reason: String },
}

/// A notification could not be delivered to one of the channels
///
/// Logged by the bus, never returned to command callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("MQTT publish to {topic} failed: {reason}")]
    Mqtt { topic: String, reason: String },

    #[error("WebSocket delivery failed: {0}")]
    WebSocket(String),
}
