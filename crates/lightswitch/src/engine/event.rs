use serde::Deserialize;
use serde_json::Value;

use super::message::RawMessage;
use super::state::SensorState;

/// Topic on which the RF bridge publishes received remote-control codes.
pub const TELEMETRY_TOPIC: &str = "tasmota/tele/sonoff/RESULT";

/// A broker message paired with the sensor state in effect when it was combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedMessage {
    pub message: RawMessage,
    pub state: SensorState,
}

/// A decoded RF receipt from the telemetry topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryMessage {
    pub sync_interval: i64,
    pub low_pulse: i64,
    pub high_pulse: i64,
    /// The received code, matched against switch configuration.
    pub data: String,
    pub key: String,
    pub state: SensorState,
}

/// Rule-level events.
///
/// Distinct from `CombinedMessage` (transport-level). The classifier converts
/// one into the other at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Telemetry(TelemetryMessage),
    Plain(CombinedMessage),
}

#[derive(Debug, thiserror::Error)]
#[error("malformed telemetry payload on {topic}")]
pub struct DecodeError {
    pub topic: String,
    #[source]
    pub source: serde_json::Error,
}

/// Wire format: `{"RfReceived": {"Sync": .., "Low": .., "High": .., "Data": "..", "RfKey": ".."}}`
#[derive(Debug, Deserialize)]
struct TelemetryPayload {
    #[serde(rename = "RfReceived")]
    rf_received: RfReceived,
}

/// Only `Data` is required; rules never look at the pulse timings or key.
#[derive(Debug, Deserialize)]
struct RfReceived {
    #[serde(rename = "Sync", default)]
    sync: i64,
    #[serde(rename = "Low", default)]
    low: i64,
    #[serde(rename = "High", default)]
    high: i64,
    #[serde(rename = "Data")]
    data: String,
    /// `"None"` for raw codes, a number for learned keys
    #[serde(rename = "RfKey", default)]
    rf_key: Value,
}

fn key_text(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl TelemetryMessage {
    pub fn decode(combined: &CombinedMessage) -> Result<Self, DecodeError> {
        let payload: TelemetryPayload = serde_json::from_str(&combined.message.payload)
            .map_err(|source| DecodeError {
                topic: combined.message.topic.clone(),
                source,
            })?;
        let rf = payload.rf_received;

        Ok(Self {
            sync_interval: rf.sync,
            low_pulse: rf.low,
            high_pulse: rf.high,
            data: rf.data,
            key: key_text(rf.rf_key),
            state: combined.state,
        })
    }
}

impl Event {
    /// Classify a combined message as telemetry or plain.
    ///
    /// Only messages on [`TELEMETRY_TOPIC`] are decoded; everything else is
    /// passed through untouched.
    pub fn classify(combined: CombinedMessage) -> Result<Self, DecodeError> {
        if combined.message.topic == TELEMETRY_TOPIC {
            TelemetryMessage::decode(&combined).map(Event::Telemetry)
        } else {
            Ok(Event::Plain(combined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combined(topic: &str, payload: &str) -> CombinedMessage {
        CombinedMessage {
            message: RawMessage::new(topic, payload),
            state: SensorState::new(true, false),
        }
    }

    #[test]
    fn test_decode_rf_received() {
        let msg = combined(
            TELEMETRY_TOPIC,
            r#"{"RfReceived": {"Sync": 7560, "Low": 250, "High": 710, "Data": "devid2", "RfKey": "None"}}"#,
        );

        let telemetry = TelemetryMessage::decode(&msg).unwrap();
        assert_eq!(telemetry.sync_interval, 7560);
        assert_eq!(telemetry.low_pulse, 250);
        assert_eq!(telemetry.high_pulse, 710);
        assert_eq!(telemetry.data, "devid2");
        assert_eq!(telemetry.key, "None");
        assert_eq!(telemetry.state, SensorState::new(true, false));
    }

    #[test]
    fn test_decode_learned_key_is_numeric() {
        let msg = combined(
            TELEMETRY_TOPIC,
            r#"{"RfReceived": {"Sync": 12120, "Low": 400, "High": 1180, "Data": "E5D45E", "RfKey": 1}}"#,
        );

        let telemetry = TelemetryMessage::decode(&msg).unwrap();
        assert_eq!(telemetry.data, "E5D45E");
        assert_eq!(telemetry.key, "1");
        assert_eq!(telemetry.sync_interval, 12120);
    }

    #[test]
    fn test_decode_only_data() {
        let msg = combined(TELEMETRY_TOPIC, r#"{"RfReceived": {"Data": "devid2"}}"#);

        let telemetry = TelemetryMessage::decode(&msg).unwrap();
        assert_eq!(telemetry.data, "devid2");
        assert_eq!(telemetry.key, "");
        assert_eq!(
            (telemetry.sync_interval, telemetry.low_pulse, telemetry.high_pulse),
            (0, 0, 0)
        );
    }

    #[test]
    fn test_decode_rejects_missing_data() {
        let msg = combined(TELEMETRY_TOPIC, r#"{"RfReceived": {"Sync": 1, "RfKey": "None"}}"#);
        assert!(TelemetryMessage::decode(&msg).is_err());
    }

    #[test]
    fn test_classify_plain_passes_through() {
        let msg = combined("zigbee2mqtt/button", "not json at all");
        match Event::classify(msg.clone()).unwrap() {
            Event::Plain(plain) => assert_eq!(plain, msg),
            other => panic!("expected plain message, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_telemetry() {
        let msg = combined(
            TELEMETRY_TOPIC,
            r#"{"RfReceived": {"Sync": 1, "Low": 2, "High": 3, "Data": "abc", "RfKey": "1"}}"#,
        );
        assert!(matches!(
            Event::classify(msg).unwrap(),
            Event::Telemetry(TelemetryMessage { ref data, .. }) if data == "abc"
        ));
    }

    #[test]
    fn test_classify_bad_telemetry_is_error() {
        let err = Event::classify(combined(TELEMETRY_TOPIC, "{{bad")).unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"malformed telemetry payload on tasmota/tele/sonoff/RESULT"
        );
    }
}
