//! Sensor interrupt dispatch
//!
//! Rising and falling edges of the four sensor pins arrive on one bounded
//! channel. A single task drains it in arrival order, classifies each edge
//! and hands the resulting state to the [`NotificationBus`].

use garage_config::DoorsConfig;
use garage_core::{
    DoorId, DoorState, Edge, HardwareError, NotificationFact, PinEdge, PinId, SensorRole,
};
use garage_gpio::{EdgeSink, HardwareFacade};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::NotificationBus;

pub struct InterruptDispatcher {
    bus: NotificationBus,
    sensors: HashMap<PinId, (DoorId, SensorRole)>,
}

impl InterruptDispatcher {
    pub fn new(bus: NotificationBus, doors: &DoorsConfig) -> Self {
        let sensors = DoorId::ALL
            .into_iter()
            .flat_map(|door| {
                doors
                    .pins(door)
                    .sensors()
                    .map(|(role, pin)| (pin, (door, role)))
            })
            .collect();
        Self { bus, sensors }
    }

    /// Register both edges on every sensor pin and spawn the drain task
    pub fn start(
        self,
        hardware: &dyn HardwareFacade,
        capacity: usize,
    ) -> Result<JoinHandle<()>, HardwareError> {
        let (sink, rx) = EdgeSink::channel(capacity);
        self.register(hardware, &sink)?;
        info!(interrupts = self.sensors.len() * 2, "Sensor interrupts registered");
        Ok(tokio::spawn(self.run(rx)))
    }

    fn register(
        &self,
        hardware: &dyn HardwareFacade,
        sink: &EdgeSink,
    ) -> Result<(), HardwareError> {
        for pin in self.sensors.keys() {
            for edge in [Edge::Rising, Edge::Falling] {
                hardware.register_interrupt(*pin, edge, sink.clone())?;
            }
        }
        Ok(())
    }

    /// Drain edges until every sink is dropped
    pub async fn run(self, mut edges: mpsc::Receiver<PinEdge>) {
        while let Some(edge) = edges.recv().await {
            self.dispatch(edge);
        }
        debug!("Edge channel closed, dispatcher stopped");
    }

    /// Door and state an edge stands for
    pub fn classify(&self, edge: &PinEdge) -> Option<(DoorId, DoorState)> {
        let (door, role) = self.sensors.get(&edge.pin)?;
        let state = match edge.edge {
            Edge::Rising => role.arrived_state(),
            Edge::Falling => DoorState::Moving,
        };
        Some((*door, state))
    }

    /// Classify one edge and notify
    pub fn dispatch(&self, edge: PinEdge) -> Option<NotificationFact> {
        let Some((door, state)) = self.classify(&edge) else {
            warn!(pin = %edge.pin, edge = %edge.edge, "Edge on a pin that is not a door sensor");
            return None;
        };

        debug!(
            pin = %edge.pin,
            edge = %edge.edge,
            elapsed_ms = edge.elapsed.as_millis() as u64,
            door = %door,
            state = %state,
            "Sensor edge"
        );

        let fact = match state {
            DoorState::Open => self.bus.notify_garage_opened(door),
            DoorState::Closed => self.bus.notify_garage_closed(door),
            _ => self.bus.notify_garage_moving(door),
        };
        Some(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{doors, mqtt_config, RecordingMqtt};
    use garage_core::Level;
    use garage_doors::DoorSensors;
    use garage_gpio::SimulatedGpio;
    use std::sync::Arc;
    use std::time::Duration;

    fn edge(pin: u8, edge: Edge) -> PinEdge {
        PinEdge {
            pin: PinId(pin),
            edge,
            elapsed: Duration::ZERO,
        }
    }

    fn dispatcher() -> (
        Arc<SimulatedGpio>,
        Arc<RecordingMqtt>,
        NotificationBus,
        InterruptDispatcher,
    ) {
        let gpio = Arc::new(SimulatedGpio::new());
        let sensors = DoorSensors::new(gpio.clone(), doors());
        sensors.setup().unwrap();
        let mqtt = Arc::new(RecordingMqtt::default());
        let bus = NotificationBus::with_mqtt(sensors, mqtt.clone(), &mqtt_config());
        let dispatcher = InterruptDispatcher::new(bus.clone(), &doors());
        (gpio, mqtt, bus, dispatcher)
    }

    #[test]
    fn test_classification() {
        let (_gpio, _mqtt, _bus, dispatcher) = dispatcher();

        let cases = [
            (22, Edge::Rising, DoorId::Left, DoorState::Open),
            (27, Edge::Rising, DoorId::Left, DoorState::Closed),
            (22, Edge::Falling, DoorId::Left, DoorState::Moving),
            (27, Edge::Falling, DoorId::Left, DoorState::Moving),
            (23, Edge::Rising, DoorId::Right, DoorState::Open),
            (24, Edge::Rising, DoorId::Right, DoorState::Closed),
            (23, Edge::Falling, DoorId::Right, DoorState::Moving),
            (24, Edge::Falling, DoorId::Right, DoorState::Moving),
        ];
        for (pin, dir, door, state) in cases {
            assert_eq!(dispatcher.classify(&edge(pin, dir)), Some((door, state)));
        }
        assert_eq!(dispatcher.classify(&edge(17, Edge::Rising)), None);
    }

    #[tokio::test]
    async fn test_edge_on_unknown_pin_is_ignored() {
        let (_gpio, mqtt, bus, dispatcher) = dispatcher();
        let mut rx = bus.subscribe();

        assert!(dispatcher.dispatch(edge(5, Edge::Rising)).is_none());
        assert!(rx.try_recv().is_err());
        assert!(mqtt.published().is_empty());
    }

    #[tokio::test]
    async fn test_rising_open_sensor_notifies_open() {
        let (gpio, mqtt, bus, dispatcher) = dispatcher();
        let mut rx = bus.subscribe();
        let _task = dispatcher.start(gpio.as_ref(), 16).unwrap();

        gpio.set_input(PinId(22), Level::High);

        let fact = rx.recv().await.unwrap();
        assert_eq!((fact.door, fact.state), (DoorId::Left, DoorState::Open));
        assert_eq!(
            mqtt.published(),
            vec![("garage/left".to_string(), r#"{"state":"Open"}"#.to_string())]
        );
    }

    #[tokio::test]
    async fn test_falling_edge_notifies_moving_for_that_door_only() {
        let (gpio, mqtt, bus, dispatcher) = dispatcher();
        gpio.set_input(PinId(24), Level::High);
        let mut rx = bus.subscribe();
        let _task = dispatcher.start(gpio.as_ref(), 16).unwrap();

        gpio.set_input(PinId(24), Level::Low);

        let fact = rx.recv().await.unwrap();
        assert_eq!((fact.door, fact.state), (DoorId::Right, DoorState::Moving));
        let published = mqtt.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "garage/right");
    }

    #[tokio::test]
    async fn test_edges_processed_in_arrival_order() {
        let (gpio, _mqtt, bus, dispatcher) = dispatcher();
        let mut rx = bus.subscribe();
        let _task = dispatcher.start(gpio.as_ref(), 16).unwrap();

        // Left door closes: open sensor drops, closed sensor rises
        gpio.set_input(PinId(22), Level::High);
        gpio.set_input(PinId(22), Level::Low);
        gpio.set_input(PinId(27), Level::High);

        let mut states = Vec::new();
        for _ in 0..3 {
            states.push(rx.recv().await.unwrap().state);
        }
        assert_eq!(
            states,
            vec![DoorState::Open, DoorState::Moving, DoorState::Closed]
        );
    }

    #[tokio::test]
    async fn test_one_broadcast_per_edge() {
        let (gpio, mqtt, bus, dispatcher) = dispatcher();
        let mut rx = bus.subscribe();
        let task = dispatcher.start(gpio.as_ref(), 16).unwrap();

        gpio.set_input(PinId(23), Level::High);
        gpio.set_input(PinId(23), Level::High);
        rx.recv().await.unwrap();

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(mqtt.published().len(), 1);
        task.abort();
    }
}
