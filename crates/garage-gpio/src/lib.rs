//! Hardware facade for the garage door controller
//!
//! Everything above this crate talks to pins through [`HardwareFacade`].
//! Interrupts are not delivered through callbacks into the rest of the
//! system: a backend pushes every observed edge into an [`EdgeSink`], which
//! is the sending half of a bounded channel drained by the interrupt
//! dispatcher.
//!
//! Backends:
//! - [`SimulatedGpio`] - in-memory pins, used for development and tests
//! - `RppalGpio` - Raspberry Pi GPIO via `rppal` (feature `rpi`)

mod simulated;

#[cfg(feature = "rpi")]
mod rpi;

use garage_core::{Edge, HardwareError, Level, PinEdge, PinId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

pub use simulated::{PinWrite, SimulatedGpio};

#[cfg(feature = "rpi")]
pub use rpi::RppalGpio;

/// Default capacity of the edge channel between backend and dispatcher
pub const DEFAULT_EDGE_CAPACITY: usize = 256;

/// Pull resistor configuration for input pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

/// Pin-level access to the board
///
/// All operations are synchronous and short; none of them sleeps.
pub trait HardwareFacade: Send + Sync {
    /// Configure a pin as an output
    fn setup_output(&self, pin: PinId) -> Result<(), HardwareError>;

    /// Configure a pin as an input with the given pull resistor
    fn setup_input(&self, pin: PinId, pull: Pull) -> Result<(), HardwareError>;

    /// Read the current level of a pin (true = high)
    fn read(&self, pin: PinId) -> Result<bool, HardwareError>;

    /// Drive an output pin to a level
    fn write(&self, pin: PinId, level: Level) -> Result<(), HardwareError>;

    /// Deliver every `edge` transition on `pin` into `sink`
    fn register_interrupt(&self, pin: PinId, edge: Edge, sink: EdgeSink)
        -> Result<(), HardwareError>;

    /// Human-readable board identifier
    fn board_id(&self) -> String;
}

/// Thread-safe handle to a hardware backend
pub type SharedHardware = Arc<dyn HardwareFacade>;

/// Sending half of the bounded edge channel
///
/// Backends call [`EdgeSink::push`] from their interrupt context. A full
/// channel drops the edge with a warning instead of blocking the caller.
#[derive(Debug, Clone)]
pub struct EdgeSink {
    tx: mpsc::Sender<PinEdge>,
}

impl EdgeSink {
    /// Create a sink and the receiver the dispatcher drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PinEdge>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Push an edge without blocking
    ///
    /// Returns false if the edge was dropped.
    pub fn push(&self, edge: PinEdge) -> bool {
        match self.tx.try_send(edge) {
            Ok(()) => true,
            Err(TrySendError::Full(edge)) => {
                warn!(pin = %edge.pin, edge = %edge.edge, "Edge channel full, dropping edge");
                false
            }
            Err(TrySendError::Closed(edge)) => {
                trace!(pin = %edge.pin, "Edge channel closed");
                false
            }
        }
    }
}
