//! Notification fan-out for the garage door controller
//!
//! [`NotificationBus`] broadcasts every door-state fact to WebSocket
//! subscribers and publishes it to the door's MQTT topic.
//! [`InterruptDispatcher`] turns sensor edges into those facts.

mod bus;
mod dispatcher;
mod mqtt;

pub use bus::{NotificationBus, DEFAULT_CHANNEL_CAPACITY};
pub use dispatcher::InterruptDispatcher;
pub use mqtt::{MqttConnection, MqttPublisher, MqttSink};
