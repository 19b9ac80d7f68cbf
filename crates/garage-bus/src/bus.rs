//! Door-state notification bus
//!
//! Every notification is one [`NotificationFact`], broadcast to WebSocket
//! subscribers first and then published to the door's MQTT topic. Delivery
//! failures are logged and never reach the caller.
//!
//! Notifications are serialized: both channels see facts in the same order,
//! and a state refresh reads and notifies both doors without another fact
//! slipping in between.

use garage_config::MqttConfig;
use garage_core::{DoorId, DoorState, NotificationFact};
use garage_doors::DoorSensors;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::MqttSink;

/// Default capacity of the subscriber channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

struct MqttRoute {
    sink: Arc<dyn MqttSink>,
    left_topic: String,
    right_topic: String,
}

impl MqttRoute {
    fn topic(&self, door: DoorId) -> &str {
        match door {
            DoorId::Left => &self.left_topic,
            DoorId::Right => &self.right_topic,
        }
    }
}

struct Inner {
    sender: broadcast::Sender<NotificationFact>,
    mqtt: Option<MqttRoute>,
    sensors: DoorSensors,
    // Held from broadcast through MQTT publish
    order: Mutex<()>,
}

/// Fans door-state facts out to every subscriber
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<Inner>,
}

impl NotificationBus {
    /// A bus without MQTT
    pub fn new(sensors: DoorSensors) -> Self {
        Self::build(sensors, None, DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus that also publishes to the configured MQTT topics
    pub fn with_mqtt(sensors: DoorSensors, sink: Arc<dyn MqttSink>, config: &MqttConfig) -> Self {
        let route = MqttRoute {
            sink,
            left_topic: config.topic(DoorId::Left).to_string(),
            right_topic: config.topic(DoorId::Right).to_string(),
        };
        Self::build(sensors, Some(route), DEFAULT_CHANNEL_CAPACITY)
    }

    fn build(sensors: DoorSensors, mqtt: Option<MqttRoute>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                sender,
                mqtt,
                sensors,
                order: Mutex::new(()),
            }),
        }
    }

    /// Receive every fact broadcast from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationFact> {
        self.inner.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    pub fn sensors(&self) -> &DoorSensors {
        &self.inner.sensors
    }

    fn ordered(&self) -> MutexGuard<'_, ()> {
        self.inner.order.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Broadcast a door state, then publish it over MQTT
    pub fn notify_garage(&self, state: DoorState, door: DoorId) -> NotificationFact {
        let _ordered = self.ordered();
        self.emit(state, door)
    }

    fn emit(&self, state: DoorState, door: DoorId) -> NotificationFact {
        let fact = NotificationFact::now(door, state);
        debug!(door = %door, state = %state, "Garage state notification");

        if self.inner.sender.send(fact).is_err() {
            trace!("No WebSocket subscribers");
        }

        if let Some(route) = &self.inner.mqtt {
            let topic = route.topic(door);
            match route.sink.publish(topic, fact.mqtt_payload()) {
                Ok(()) => trace!(topic, state = %state, "Published MQTT state"),
                Err(e) => warn!(error = %e, "MQTT delivery failed"),
            }
        }

        fact
    }

    pub fn notify_garage_opened(&self, door: DoorId) -> NotificationFact {
        self.notify_garage(DoorState::Open, door)
    }

    pub fn notify_garage_closed(&self, door: DoorId) -> NotificationFact {
        self.notify_garage(DoorState::Closed, door)
    }

    pub fn notify_garage_moving(&self, door: DoorId) -> NotificationFact {
        self.notify_garage(DoorState::Moving, door)
    }

    pub fn notify_garage_error(&self, door: DoorId) -> NotificationFact {
        self.notify_garage(DoorState::Error, door)
    }

    /// Live state of one door; a sensor read failure reads as `Unknown`
    pub fn read_door_state(&self, door: DoorId) -> DoorState {
        self.inner
            .sensors
            .garage_door_status(door)
            .unwrap_or_else(|e| {
                warn!(door = %door, error = %e, "Failed to read door sensors");
                DoorState::Unknown
            })
    }

    /// Live `[left, right]` states
    pub fn read_garage_state(&self) -> [DoorState; 2] {
        let states = DoorId::ALL.map(|door| self.read_door_state(door));
        debug!(left = %states[0], right = %states[1], "Read garage state");
        states
    }

    /// Re-read both doors and notify each, left first
    pub fn notify_garage_states(&self) -> [NotificationFact; 2] {
        let _ordered = self.ordered();
        let [left, right] = self.read_garage_state();
        [
            self.emit(left, DoorId::Left),
            self.emit(right, DoorId::Right),
        ]
    }
}
