//! Pin identifiers, logic levels and edge events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A GPIO line number (BCM numbering on a Raspberry Pi)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u8);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("LOW"),
            Level::High => f.write_str("HIGH"),
        }
    }
}

/// Direction of a pin transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// 0 -> 1
    Rising,
    /// 1 -> 0
    Falling,
}

impl Edge {
    /// Edge produced by moving from `from` to `to`, if the level changed
    pub fn between(from: Level, to: Level) -> Option<Edge> {
        match (from, to) {
            (Level::Low, Level::High) => Some(Edge::Rising),
            (Level::High, Level::Low) => Some(Edge::Falling),
            _ => None,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("rising"),
            Edge::Falling => f.write_str("falling"),
        }
    }
}

/// An edge observed on a pin by the hardware facade
///
/// Consumed exactly once by the interrupt dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEdge {
    pub pin: PinId,
    pub edge: Edge,
    /// Time since the previous edge on the same pin (zero for the first edge)
    pub elapsed: Duration,
}
