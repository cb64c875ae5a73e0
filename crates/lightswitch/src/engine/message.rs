//! Type-safe message system for lightswitch
//!
//! Messages are split by direction, matching the two boundaries of the engine:
//! - `RawMessage`: publishes arriving from the broker integration
//! - `Command`: device actions leaving the engine for the bridge integration

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A single publish received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: String,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// One addressable light or light group on a named bridge.
///
/// All three fields together form the device key used by the turn-off
/// scheduler, so a light and a group sharing a numeric id never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub bridge_name: String,
    pub id: u32,
    #[serde(default)]
    pub is_group: bool,
}

impl DeviceTarget {
    pub fn light(bridge_name: impl Into<String>, id: u32) -> Self {
        Self {
            bridge_name: bridge_name.into(),
            id,
            is_group: false,
        }
    }

    pub fn group(bridge_name: impl Into<String>, id: u32) -> Self {
        Self {
            bridge_name: bridge_name.into(),
            id,
            is_group: true,
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_group { "group" } else { "light" };
        write!(f, "{}/{}:{}", self.bridge_name, kind, self.id)
    }
}

/// Messages FROM the engine TO the bridge integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Flip the device's current on/off state
    Toggle(DeviceTarget),

    /// Switch the device on regardless of its current state
    TurnOn(DeviceTarget),

    /// Switch the device off regardless of its current state
    TurnOff(DeviceTarget),
}

impl Command {
    pub fn device(&self) -> &DeviceTarget {
        match self {
            Command::Toggle(d) | Command::TurnOn(d) | Command::TurnOff(d) => d,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Toggle(d) => write!(f, "toggle {}", d),
            Command::TurnOn(d) => write!(f, "turn-on {}", d),
            Command::TurnOff(d) => write!(f, "turn-off {}", d),
        }
    }
}
