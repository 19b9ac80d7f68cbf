//! Named garage commands
//!
//! Every command is the same actuator pulse; open/close/switch only label
//! the request. The "both doors" commands pulse the right door first.

use garage_config::GarageConfig;
use garage_core::{DoorId, HardwareError};
use garage_gpio::SharedHardware;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::{Ack, ActuatorError, DoorActuator, DoorSensors};

#[derive(Clone)]
pub struct GarageController {
    left: Arc<DoorActuator>,
    right: Arc<DoorActuator>,
    sensors: DoorSensors,
    hardware: SharedHardware,
    board_id: Option<String>,
}

impl GarageController {
    pub fn new(
        hardware: SharedHardware,
        config: &GarageConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let actuator = |door: DoorId| {
            Arc::new(DoorActuator::new(
                door,
                config.door(door).actuator,
                hardware.clone(),
                config.pin_move_delay(),
                shutdown.clone(),
            ))
        };

        Self {
            left: actuator(DoorId::Left),
            right: actuator(DoorId::Right),
            sensors: DoorSensors::new(hardware.clone(), config.doors),
            hardware,
            board_id: config.board_id.clone(),
        }
    }

    /// Configure actuator outputs and sensor inputs, logging their levels
    pub fn setup_pins(&self) -> Result<(), HardwareError> {
        for actuator in [&self.left, &self.right] {
            self.hardware.setup_output(actuator.pin())?;
            info!(
                door = %actuator.door(),
                pin = %actuator.pin(),
                high = self.hardware.read(actuator.pin())?,
                "Actuator configured"
            );
        }
        self.sensors.setup()
    }

    pub fn sensors(&self) -> &DoorSensors {
        &self.sensors
    }

    pub fn actuator(&self, door: DoorId) -> &DoorActuator {
        match door {
            DoorId::Left => &self.left,
            DoorId::Right => &self.right,
        }
    }

    /// Board identifier, the configured one if present
    pub fn info(&self) -> String {
        self.board_id
            .clone()
            .unwrap_or_else(|| self.hardware.board_id())
    }

    async fn pulse(&self, door: DoorId, command: &'static str) -> Result<Ack, ActuatorError> {
        info!(door = %door, command, "Door command");
        self.actuator(door).pulse().await
    }

    pub async fn open_right_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Right, "open").await
    }

    pub async fn close_right_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Right, "close").await
    }

    pub async fn switch_right_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Right, "switch").await
    }

    pub async fn open_left_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Left, "open").await
    }

    pub async fn close_left_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Left, "close").await
    }

    pub async fn switch_left_door(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Left, "switch").await
    }

    /// Right door, then left; a failed right pulse skips the left one
    pub async fn open_doors(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Right, "open").await?;
        self.pulse(DoorId::Left, "open").await
    }

    /// Right door, then left; a failed right pulse skips the left one
    pub async fn close_doors(&self) -> Result<Ack, ActuatorError> {
        self.pulse(DoorId::Right, "close").await?;
        self.pulse(DoorId::Left, "close").await
    }
}
