use garage_core::{DoorId, HardwareError};
use thiserror::Error;

/// Failure of a door command
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActuatorError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// The process is shutting down; the pin was driven low early
    #[error("pulse on {door} door cancelled by shutdown")]
    Cancelled { door: DoorId },
}
