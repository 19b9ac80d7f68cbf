use garage_config::DoorsConfig;
use garage_core::{evaluate, DoorId, DoorPins, DoorState, HardwareError, SensorRole};
use garage_gpio::{Pull, SharedHardware};
use tracing::{debug, info};

/// Reads both doors' position sensors
///
/// States are evaluated on every call from the live pin levels; nothing is
/// cached.
#[derive(Clone)]
pub struct DoorSensors {
    hardware: SharedHardware,
    doors: DoorsConfig,
}

impl DoorSensors {
    pub fn new(hardware: SharedHardware, doors: DoorsConfig) -> Self {
        Self { hardware, doors }
    }

    pub fn pins(&self, door: DoorId) -> DoorPins {
        self.doors.pins(door)
    }

    /// Configure the four sensor pins as pulled-down inputs and log their levels
    pub fn setup(&self) -> Result<(), HardwareError> {
        for door in DoorId::ALL {
            let pins = self.pins(door);
            for (_, pin) in pins.sensors() {
                self.hardware.setup_input(pin, Pull::Down)?;
            }
            info!(
                door = %door,
                open_sensor = self.hardware.read(pins.open_sensor)?,
                closed_sensor = self.hardware.read(pins.closed_sensor)?,
                "Initial sensor levels"
            );
        }
        Ok(())
    }

    pub fn read(&self, door: DoorId, role: SensorRole) -> Result<bool, HardwareError> {
        self.hardware.read(self.pins(door).sensor(role))
    }

    /// Current state of one door
    pub fn garage_door_status(&self, door: DoorId) -> Result<DoorState, HardwareError> {
        let open = self.read(door, SensorRole::Open)?;
        let closed = self.read(door, SensorRole::Closed)?;
        if open && closed {
            debug!(door = %door, "Both sensors asserted, reporting Open");
        }
        Ok(evaluate(open, closed))
    }

    /// Current state of a door given by name; unknown names are `Unknown`
    pub fn garage_door_status_by_name(&self, name: &str) -> Result<DoorState, HardwareError> {
        match name.parse::<DoorId>() {
            Ok(door) => self.garage_door_status(door),
            Err(e) => {
                debug!(error = %e, "Status requested for unknown door");
                Ok(DoorState::Unknown)
            }
        }
    }

    /// `[left, right]`
    pub fn garage_door_statuses(&self) -> Result<[DoorState; 2], HardwareError> {
        Ok([
            self.garage_door_status(DoorId::Left)?,
            self.garage_door_status(DoorId::Right)?,
        ])
    }
}
