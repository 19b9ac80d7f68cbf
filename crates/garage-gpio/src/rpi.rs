//! Raspberry Pi GPIO backend built on `rppal`

use dashmap::DashMap;
use garage_core::{Edge, HardwareError, Level, PinEdge, PinId};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::system::DeviceInfo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{EdgeSink, HardwareFacade, Pull};

type Sinks = Arc<DashMap<PinId, Vec<(Edge, EdgeSink)>>>;

/// [`HardwareFacade`] for the Raspberry Pi GPIO header
pub struct RppalGpio {
    gpio: Gpio,
    outputs: Mutex<HashMap<PinId, OutputPin>>,
    inputs: Mutex<HashMap<PinId, InputPin>>,
    sinks: Sinks,
}

impl RppalGpio {
    pub fn new() -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        Ok(Self {
            gpio,
            outputs: Mutex::new(HashMap::new()),
            inputs: Mutex::new(HashMap::new()),
            sinks: Arc::new(DashMap::new()),
        })
    }
}

impl HardwareFacade for RppalGpio {
    fn setup_output(&self, pin: PinId) -> Result<(), HardwareError> {
        let mut outputs = self.outputs.lock().unwrap_or_else(|e| e.into_inner());
        if outputs.contains_key(&pin) {
            return Ok(());
        }
        let output = self
            .gpio
            .get(pin.0)
            .map_err(|e| HardwareError::Setup {
                pin,
                reason: e.to_string(),
            })?
            .into_output_low();
        outputs.insert(pin, output);
        Ok(())
    }

    fn setup_input(&self, pin: PinId, pull: Pull) -> Result<(), HardwareError> {
        let raw = self.gpio.get(pin.0).map_err(|e| HardwareError::Setup {
            pin,
            reason: e.to_string(),
        })?;
        let input = match pull {
            Pull::None => raw.into_input(),
            Pull::Up => raw.into_input_pullup(),
            Pull::Down => raw.into_input_pulldown(),
        };
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pin, input);
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<bool, HardwareError> {
        if let Some(input) = self
            .inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pin)
        {
            return Ok(input.is_high());
        }
        if let Some(output) = self
            .outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pin)
        {
            return Ok(output.is_set_high());
        }
        Err(HardwareError::Read {
            pin,
            reason: "pin is not set up".to_string(),
        })
    }

    fn write(&self, pin: PinId, level: Level) -> Result<(), HardwareError> {
        let mut outputs = self.outputs.lock().unwrap_or_else(|e| e.into_inner());
        let output = outputs.get_mut(&pin).ok_or_else(|| HardwareError::Write {
            pin,
            reason: "pin is not configured as output".to_string(),
        })?;
        match level {
            Level::High => output.set_high(),
            Level::Low => output.set_low(),
        }
        debug!(pin = %pin, level = %level, "GPIO write");
        Ok(())
    }

    fn register_interrupt(
        &self,
        pin: PinId,
        edge: Edge,
        sink: EdgeSink,
    ) -> Result<(), HardwareError> {
        let mut inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        let input = inputs.get_mut(&pin).ok_or_else(|| HardwareError::Interrupt {
            pin,
            reason: "pin is not configured as input".to_string(),
        })?;

        let first = {
            let mut entry = self.sinks.entry(pin).or_default();
            entry.push((edge, sink));
            entry.len() == 1
        };
        // One hardware interrupt per pin serves both edge directions
        if !first {
            return Ok(());
        }

        let sinks = self.sinks.clone();
        let mut last: Option<Duration> = None;
        input
            .set_async_interrupt(Trigger::Both, None, move |event| {
                let edge = match event.trigger {
                    Trigger::RisingEdge => Edge::Rising,
                    Trigger::FallingEdge => Edge::Falling,
                    other => {
                        warn!(pin = %pin, trigger = ?other, "Unexpected interrupt trigger");
                        return;
                    }
                };
                let elapsed = last
                    .map(|prev| event.timestamp.saturating_sub(prev))
                    .unwrap_or(Duration::ZERO);
                last = Some(event.timestamp);

                if let Some(registered) = sinks.get(&pin) {
                    let pin_edge = PinEdge { pin, edge, elapsed };
                    for (wanted, sink) in registered.iter() {
                        if *wanted == edge {
                            sink.push(pin_edge);
                        }
                    }
                }
            })
            .map_err(|e| HardwareError::Interrupt {
                pin,
                reason: e.to_string(),
            })
    }

    fn board_id(&self) -> String {
        DeviceInfo::new()
            .map(|info| info.model().to_string())
            .unwrap_or_else(|e| format!("unknown board ({})", e))
    }
}
