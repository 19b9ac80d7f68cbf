//! Timed actuator pulse
//!
//! A pulse is: output mode, write high, hold, write low. The hold is a
//! tokio timer, so other requests keep running while a door relay is
//! energised. Every exit path drives the pin low, including shutdown and
//! dropping the pulse future mid-hold.

use garage_core::{DoorId, HardwareError, Level, PinId};
use garage_gpio::{HardwareFacade, SharedHardware};
use std::fmt;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};

use crate::ActuatorError;

/// Acknowledgement returned by every successful command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

impl Ack {
    pub fn as_str(&self) -> &'static str {
        "OK"
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns one door's actuator pin
pub struct DoorActuator {
    door: DoorId,
    pin: PinId,
    hardware: SharedHardware,
    hold: Duration,
    shutdown: watch::Receiver<bool>,
    // Serializes pulses on this pin only
    lock: Mutex<()>,
}

impl DoorActuator {
    pub fn new(
        door: DoorId,
        pin: PinId,
        hardware: SharedHardware,
        hold: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            door,
            pin,
            hardware,
            hold,
            shutdown,
            lock: Mutex::new(()),
        }
    }

    pub fn door(&self) -> DoorId {
        self.door
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// Energise the actuator for the configured hold, then release it
    pub async fn pulse(&self) -> Result<Ack, ActuatorError> {
        let _serialized = self.lock.lock().await;

        self.hardware.setup_output(self.pin)?;
        let release = Release {
            hardware: self.hardware.as_ref(),
            pin: self.pin,
            armed: true,
        };

        debug!(door = %self.door, pin = %self.pin, hold = ?self.hold, "Pulsing actuator");
        let held = match self.hardware.write(self.pin, Level::High) {
            Ok(()) => self.hold().await,
            Err(e) => {
                error!(door = %self.door, pin = %self.pin, error = %e, "Failed to raise actuator");
                Err(e.into())
            }
        };

        let released = release.release();
        match (held, released) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e.into()),
            (Ok(()), Ok(())) => Ok(Ack),
        }
    }

    async fn hold(&self) -> Result<(), ActuatorError> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.hold) => Ok(()),
            _ = shutdown_requested(&mut shutdown) => {
                warn!(door = %self.door, pin = %self.pin, "Shutdown during pulse, releasing early");
                Err(ActuatorError::Cancelled { door: self.door })
            }
        }
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drives the pin low when released or dropped
struct Release<'a> {
    hardware: &'a dyn HardwareFacade,
    pin: PinId,
    armed: bool,
}

impl Release<'_> {
    fn release(mut self) -> Result<(), HardwareError> {
        self.armed = false;
        drive_low(self.hardware, self.pin)
    }
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(pin = %self.pin, "Pulse dropped mid-hold, releasing actuator");
            let _ = drive_low(self.hardware, self.pin);
        }
    }
}

/// Write low, retrying once
fn drive_low(hardware: &dyn HardwareFacade, pin: PinId) -> Result<(), HardwareError> {
    match hardware.write(pin, Level::Low) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(pin = %pin, error = %first, "Failed to release actuator, retrying");
            hardware.write(pin, Level::Low).map_err(|e| {
                error!(pin = %pin, error = %e, "Actuator pin may still be energised");
                e
            })
        }
    }
}
