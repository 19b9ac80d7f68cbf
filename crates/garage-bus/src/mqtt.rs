//! MQTT publishing via rumqttc

use garage_config::MqttConfig;
use garage_core::{NotificationError, NotificationFact};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::NotificationBus;

const REQUEST_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Destination for door-state MQTT messages
///
/// `publish` queues the message and returns without waiting for the broker.
pub trait MqttSink: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NotificationError>;
}

/// Publishes at QoS 2 through a rumqttc client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Create the client; nothing is sent until the connection is spawned
    pub fn connect(config: &MqttConfig) -> (Self, MqttConnection) {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(user) = &config.user {
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let connection = MqttConnection {
            eventloop,
            broker: format!("{}:{}", config.broker, config.port),
        };
        (Self { client }, connection)
    }
}

impl MqttSink for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NotificationError> {
        self.client
            .try_publish(topic, QoS::ExactlyOnce, false, payload)
            .map_err(|e| NotificationError::Mqtt {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Drives the MQTT event loop
pub struct MqttConnection {
    eventloop: EventLoop,
    broker: String,
}

impl MqttConnection {
    /// Poll the connection until shutdown
    ///
    /// Both doors' state is re-published on every (re)connect.
    pub fn spawn(self, bus: NotificationBus, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(bus, shutdown))
    }

    async fn run(mut self, bus: NotificationBus, mut shutdown: watch::Receiver<bool>) {
        info!(broker = %self.broker, "Starting MQTT connection");
        loop {
            let event = tokio::select! {
                event = self.eventloop.poll() => event,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            match event {
                Ok(event) => {
                    self.handle_event(&bus, &event);
                }
                Err(e) => {
                    warn!(broker = %self.broker, error = %e, "MQTT connection error, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
            }
        }
        info!("MQTT connection stopped");
    }

    /// React to one event-loop event
    ///
    /// A `ConnAck` re-notifies both doors and returns the facts.
    fn handle_event(
        &self,
        bus: &NotificationBus,
        event: &Event,
    ) -> Option<[NotificationFact; 2]> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!(broker = %self.broker, code = ?ack.code, "MQTT connected");
                Some(bus.notify_garage_states())
            }
            event => {
                debug!(?event, "MQTT event");
                None
            }
        }
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
