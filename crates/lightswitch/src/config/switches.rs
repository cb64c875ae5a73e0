//! Switch (routing rule) configuration.
//!
//! Every rule category holds two lists: `mqtt` switches matched by exact topic
//! and `telemetry` switches matched by RF code.

use serde::Deserialize;

use crate::engine::DeviceTarget;

/// All configured rules, grouped by the command they produce.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Switches {
    pub toggle: SwitchSet<MqttSwitch, TelemetrySwitch>,
    pub turn_on: SwitchSet<TurnOnMqttSwitch, TurnOnTelemetrySwitch>,
    pub turn_off: SwitchSet<MqttSwitch, TelemetrySwitch>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwitchSet<M, T> {
    pub mqtt: Vec<M>,
    pub telemetry: Vec<T>,
}

impl<M, T> Default for SwitchSet<M, T> {
    fn default() -> Self {
        Self {
            mqtt: Vec::new(),
            telemetry: Vec::new(),
        }
    }
}

/// A key/value pair that must be present in a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadFilter {
    pub key: String,
    pub value: String,
}

/// Rule matched by exact broker topic.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSwitch {
    pub topic: String,

    /// Combined by OR; an empty list matches any payload.
    ///
    /// `value` is compared against the payload field as text: strings as-is,
    /// numbers and booleans in their JSON form (`42`, `true`, `false`) and
    /// `null` as the empty string. A filter for `True` never matches a JSON
    /// boolean.
    #[serde(default)]
    pub payload_filters: Vec<PayloadFilter>,

    #[serde(default)]
    pub devices: Vec<DeviceTarget>,
}

/// Rule matched by exact RF code from the telemetry topic.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySwitch {
    pub code: String,

    #[serde(default)]
    pub devices: Vec<DeviceTarget>,
}

/// Gates and auto-off delay shared by both kinds of turn-on switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TurnOnOptions {
    /// Only fire while the light-level sensor reports darkness
    pub only_when_dark: bool,

    /// Only fire while the daylight sensor reports night
    pub only_when_night: bool,

    /// Send a turn-off this many milliseconds later; 0 disables it
    pub turn_off_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnOnTelemetrySwitch {
    #[serde(flatten)]
    pub switch: TelemetrySwitch,

    #[serde(flatten)]
    pub options: TurnOnOptions,
}

/// Accepted in configuration, but plain-topic messages never trigger
/// turn-on rules.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnOnMqttSwitch {
    #[serde(flatten)]
    pub switch: MqttSwitch,

    #[serde(flatten)]
    pub options: TurnOnOptions,
}

impl Switches {
    /// Iterate over every device referenced by any rule.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceTarget> {
        let toggle = self
            .toggle
            .mqtt
            .iter()
            .flat_map(|s| &s.devices)
            .chain(self.toggle.telemetry.iter().flat_map(|s| &s.devices));
        let turn_on = self
            .turn_on
            .mqtt
            .iter()
            .flat_map(|s| &s.switch.devices)
            .chain(self.turn_on.telemetry.iter().flat_map(|s| &s.switch.devices));
        let turn_off = self
            .turn_off
            .mqtt
            .iter()
            .flat_map(|s| &s.devices)
            .chain(self.turn_off.telemetry.iter().flat_map(|s| &s.devices));

        toggle.chain(turn_on).chain(turn_off)
    }

    /// Iterate over every topic referenced by an mqtt rule.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.toggle
            .mqtt
            .iter()
            .map(|s| s.topic.as_str())
            .chain(self.turn_on.mqtt.iter().map(|s| s.switch.topic.as_str()))
            .chain(self.turn_off.mqtt.iter().map(|s| s.topic.as_str()))
    }

    /// Iterate over every RF code referenced by a telemetry rule.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.toggle
            .telemetry
            .iter()
            .map(|s| s.code.as_str())
            .chain(self.turn_on.telemetry.iter().map(|s| s.switch.code.as_str()))
            .chain(self.turn_off.telemetry.iter().map(|s| s.code.as_str()))
    }
}
