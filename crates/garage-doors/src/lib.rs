//! Door actuators, sensors and command operations
//!
//! [`DoorActuator`] drives an actuator pin through a timed pulse,
//! [`DoorSensors`] derives door states from the sensor pins, and
//! [`GarageController`] exposes the named commands the HTTP gateway calls.

mod actuator;
mod controller;
mod error;
mod sensors;

pub use actuator::{Ack, DoorActuator};
pub use controller::GarageController;
pub use error::ActuatorError;
pub use sensors::DoorSensors;
