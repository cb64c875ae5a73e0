//! Rule matching over the configured switches.
//!
//! Every lookup yields targets in configuration order: rules first, then the
//! devices listed on each rule.

use std::borrow::Cow;

use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use super::event::TelemetryMessage;
use super::message::DeviceTarget;
use super::message::RawMessage;
use super::state::SensorState;
use crate::config::MqttSwitch;
use crate::config::PayloadFilter;
use crate::config::Switches;
use crate::config::TelemetrySwitch;
use crate::config::TurnOnOptions;
use crate::config::TurnOnTelemetrySwitch;

/// Text a JSON value is compared as when checked against a payload filter.
fn filter_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

impl PayloadFilter {
    pub fn holds(&self, payload: &Map<String, Value>) -> bool {
        payload
            .get(&self.key)
            .is_some_and(|value| filter_text(value) == self.value)
    }
}

impl MqttSwitch {
    /// Exact topic match, then at least one payload filter must hold.
    pub fn matches(&self, message: &RawMessage) -> bool {
        if self.topic != message.topic {
            return false;
        }
        if self.payload_filters.is_empty() {
            return true;
        }

        match serde_json::from_str::<Map<String, Value>>(&message.payload) {
            Ok(payload) => self.payload_filters.iter().any(|f| f.holds(&payload)),
            Err(e) => {
                debug!(
                    "Payload on {} is not a JSON object, filters cannot match: {}",
                    message.topic, e
                );
                false
            }
        }
    }
}

impl TelemetrySwitch {
    pub fn matches(&self, code: &str) -> bool {
        self.code == code
    }
}

impl TurnOnOptions {
    pub fn gates_hold(&self, state: &SensorState) -> bool {
        (!self.only_when_dark || state.is_dark) && (!self.only_when_night || state.is_night())
    }
}

impl Switches {
    pub fn toggle_plain<'a>(
        &'a self,
        message: &'a RawMessage,
    ) -> impl Iterator<Item = &'a DeviceTarget> + 'a {
        self.toggle
            .mqtt
            .iter()
            .filter(move |s| s.matches(message))
            .flat_map(|s| &s.devices)
    }

    pub fn toggle_telemetry<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a DeviceTarget> + 'a {
        self.toggle
            .telemetry
            .iter()
            .filter(move |s| s.matches(code))
            .flat_map(|s| &s.devices)
    }

    /// Turn-on rules whose code matches and whose gates hold for the
    /// message's sensor state.
    pub fn turn_on_telemetry<'a>(
        &'a self,
        telemetry: &'a TelemetryMessage,
    ) -> impl Iterator<Item = &'a TurnOnTelemetrySwitch> + 'a {
        self.turn_on.telemetry.iter().filter(move |s| {
            s.switch.matches(&telemetry.data) && s.options.gates_hold(&telemetry.state)
        })
    }

    pub fn turn_off_telemetry<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a DeviceTarget> + 'a {
        self.turn_off
            .telemetry
            .iter()
            .filter(move |s| s.matches(code))
            .flat_map(|s| &s.devices)
    }
}
