//! Door state evaluation from sensor readings

use crate::DoorState;

/// Map an (open sensor, closed sensor) reading to a door state
///
/// | open | closed | state  |
/// |------|--------|--------|
/// | 1    | 1      | Open   |
/// | 1    | 0      | Open   |
/// | 0    | 1      | Closed |
/// | 0    | 0      | Moving |
///
/// The open sensor wins when both are asserted. That reading means a faulty
/// sensor or a wiring problem but is reported as `Open`, not `Error`.
pub fn evaluate(open_sensor: bool, closed_sensor: bool) -> DoorState {
    if open_sensor {
        DoorState::Open
    } else if closed_sensor {
        DoorState::Closed
    } else {
        DoorState::Moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_table() {
        let table = [
            (true, true, DoorState::Open),
            (true, false, DoorState::Open),
            (false, true, DoorState::Closed),
            (false, false, DoorState::Moving),
        ];

        for (open, closed, expected) in table {
            assert_eq!(
                evaluate(open, closed),
                expected,
                "open={} closed={}",
                open,
                closed
            );
        }
    }

    #[test]
    fn test_never_produces_error_or_unknown() {
        for open in [false, true] {
            for closed in [false, true] {
                let state = evaluate(open, closed);
                assert_ne!(state, DoorState::Error);
                assert_ne!(state, DoorState::Unknown);
            }
        }
    }
}
