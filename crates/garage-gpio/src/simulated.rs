//! In-memory GPIO backend
//!
//! Pins start low (as with pull-down inputs). Tests and the development
//! server drive sensor levels with [`SimulatedGpio::set_input`], which
//! raises edges exactly like a real interrupt would. Every write is kept in
//! a journal so callers can assert on the exact pin sequence.

use dashmap::DashMap;
use garage_core::{Edge, HardwareError, Level, PinEdge, PinId};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{EdgeSink, HardwareFacade, Pull};

const DEFAULT_BOARD_ID: &str = "Simulated GPIO board";

/// A write recorded by the simulated backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: PinId,
    pub level: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input(Pull),
    Output,
}

/// In-memory implementation of [`HardwareFacade`]
pub struct SimulatedGpio {
    board_id: String,
    levels: DashMap<PinId, Level>,
    modes: DashMap<PinId, Mode>,
    sinks: DashMap<(PinId, Edge), Vec<EdgeSink>>,
    last_edge: DashMap<PinId, Instant>,
    journal: Mutex<Vec<PinWrite>>,
    failing_writes: Mutex<HashSet<(PinId, Level)>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::with_board_id(DEFAULT_BOARD_ID)
    }

    pub fn with_board_id(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            levels: DashMap::new(),
            modes: DashMap::new(),
            sinks: DashMap::new(),
            last_edge: DashMap::new(),
            journal: Mutex::new(Vec::new()),
            failing_writes: Mutex::new(HashSet::new()),
        }
    }

    /// Current level of a pin
    pub fn level(&self, pin: PinId) -> Level {
        self.levels.get(&pin).map(|l| *l).unwrap_or(Level::Low)
    }

    /// Drive an input pin from the outside world
    ///
    /// Raises a rising or falling edge to registered sinks when the level
    /// changes. Setting the same level again raises nothing.
    pub fn set_input(&self, pin: PinId, level: Level) {
        self.transition(pin, level);
    }

    /// Every write performed so far, in order
    pub fn writes(&self) -> Vec<PinWrite> {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Writes performed on one pin, in order
    pub fn writes_to(&self, pin: PinId) -> Vec<Level> {
        self.writes()
            .into_iter()
            .filter(|w| w.pin == pin)
            .map(|w| w.level)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Make every write of `level` to `pin` fail until cleared
    ///
    /// Failed writes are still journaled.
    pub fn fail_writes(&self, pin: PinId, level: Level) {
        self.failing_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((pin, level));
    }

    pub fn clear_failures(&self) {
        self.failing_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Whether the pin has been configured as an output
    pub fn is_output(&self, pin: PinId) -> bool {
        matches!(self.modes.get(&pin).map(|m| *m), Some(Mode::Output))
    }

    /// Pull resistor of an input pin
    pub fn pull(&self, pin: PinId) -> Option<Pull> {
        match self.modes.get(&pin).map(|m| *m) {
            Some(Mode::Input(pull)) => Some(pull),
            _ => None,
        }
    }

    fn transition(&self, pin: PinId, level: Level) {
        let previous = self.levels.insert(pin, level).unwrap_or(Level::Low);
        let Some(edge) = Edge::between(previous, level) else {
            return;
        };

        let now = Instant::now();
        let elapsed = self
            .last_edge
            .insert(pin, now)
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or(Duration::ZERO);

        trace!(pin = %pin, edge = %edge, ?elapsed, "Simulated edge");

        if let Some(sinks) = self.sinks.get(&(pin, edge)) {
            let event = PinEdge { pin, edge, elapsed };
            for sink in sinks.iter() {
                sink.push(event);
            }
        }
    }
}

impl Default for SimulatedGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareFacade for SimulatedGpio {
    fn setup_output(&self, pin: PinId) -> Result<(), HardwareError> {
        self.modes.insert(pin, Mode::Output);
        Ok(())
    }

    fn setup_input(&self, pin: PinId, pull: Pull) -> Result<(), HardwareError> {
        self.modes.insert(pin, Mode::Input(pull));
        if pull == Pull::Up && !self.levels.contains_key(&pin) {
            self.levels.insert(pin, Level::High);
        }
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<bool, HardwareError> {
        Ok(self.level(pin).is_high())
    }

    fn write(&self, pin: PinId, level: Level) -> Result<(), HardwareError> {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PinWrite { pin, level });

        if !self.is_output(pin) {
            return Err(HardwareError::Write {
                pin,
                reason: "pin is not configured as output".to_string(),
            });
        }

        let failing = self
            .failing_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(pin, level));
        if failing {
            return Err(HardwareError::Write {
                pin,
                reason: "simulated write failure".to_string(),
            });
        }

        debug!(pin = %pin, level = %level, "Simulated write");
        self.transition(pin, level);
        Ok(())
    }

    fn register_interrupt(
        &self,
        pin: PinId,
        edge: Edge,
        sink: EdgeSink,
    ) -> Result<(), HardwareError> {
        self.sinks.entry((pin, edge)).or_default().push(sink);
        Ok(())
    }

    fn board_id(&self) -> String {
        self.board_id.clone()
    }
}
