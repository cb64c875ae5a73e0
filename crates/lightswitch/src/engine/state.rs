use serde::Deserialize;
use serde::Serialize;

/// Snapshot of the environmental sensors that gate turn-on rules.
///
/// The zero value (`is_dark = false`, `is_daylight = false`) stands in until
/// the first reading arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorState {
    /// The bridge's light-level sensor reports darkness.
    pub is_dark: bool,

    /// The bridge's daylight sensor reports the sun is up.
    pub is_daylight: bool,
}

impl SensorState {
    pub fn new(is_dark: bool, is_daylight: bool) -> Self {
        Self {
            is_dark,
            is_daylight,
        }
    }

    pub fn is_night(&self) -> bool {
        !self.is_daylight
    }
}
