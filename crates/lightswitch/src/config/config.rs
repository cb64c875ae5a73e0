use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use super::switches::Switches;

/// Sensor polling faster than this would hammer the bridge
pub const MIN_SENSOR_INTERVAL_MS: u64 = 100;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
    pub sensors: Option<SensorConfig>,
    #[serde(default)]
    pub switches: Switches,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"lightswitch::engine" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "lightswitchd".to_string()
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// A Hue bridge reachable over the local REST API
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Name referenced by `bridge_name` in switch devices
    pub name: String,

    /// Hostname or IP address, optionally with a port
    pub host: String,

    /// API username issued by the bridge
    pub user: String,
}

/// Which bridge sensors provide the dark/daylight state
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub bridge: String,
    pub dark_sensor_id: u32,
    pub daylight_sensor_id: u32,
    pub interval_ms: u64,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }

    pub fn bridge(&self, name: &str) -> Option<&BridgeConfig> {
        self.bridges.iter().find(|b| b.name == name)
    }

    /// Check cross-references between sections, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        // A persistent broker session needs a stable client id
        if self.mqtt.client_id.is_empty() {
            problems.push("mqtt.client_id must not be empty".to_string());
        }

        let mut names = HashSet::new();
        for bridge in &self.bridges {
            if !names.insert(bridge.name.as_str()) {
                problems.push(format!("bridge '{}' is defined more than once", bridge.name));
            }
        }

        if let Some(sensors) = &self.sensors {
            if !names.contains(sensors.bridge.as_str()) {
                problems.push(format!(
                    "sensors.bridge refers to unknown bridge '{}'",
                    sensors.bridge
                ));
            }
            if sensors.interval_ms <= MIN_SENSOR_INTERVAL_MS {
                problems.push(format!(
                    "sensors.interval_ms must be greater than {}",
                    MIN_SENSOR_INTERVAL_MS
                ));
            }
        }

        let mut unknown: Vec<&str> = self
            .switches
            .devices()
            .map(|d| d.bridge_name.as_str())
            .filter(|name| !names.contains(name))
            .collect();
        unknown.sort_unstable();
        unknown.dedup();
        for name in unknown {
            problems.push(format!("switch device refers to unknown bridge '{}'", name));
        }

        if self.switches.topics().any(str::is_empty) {
            problems.push("switch topic must not be empty".to_string());
        }
        if self.switches.codes().any(str::is_empty) {
            problems.push("switch code must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [mqtt]
        broker = "localhost"

        [[bridges]]
        name = "hall"
        host = "192.168.1.20"
        user = "abc"
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "lightswitchd");
        assert!(config.sensors.is_none());
        assert_eq!(config.bridge("hall").unwrap().user, "abc");
        assert!(config.bridge("attic").is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "debug"
            overrides = { "lightswitch::engine" = "trace" }

            [mqtt]
            broker = "mqtt.lan"
            port = 8883
            client_id = "hallway"
            username = "user"
            password = "secret"

            [[bridges]]
            name = "hall"
            host = "192.168.1.20"
            user = "abc"

            [sensors]
            bridge = "hall"
            dark_sensor_id = 5
            daylight_sensor_id = 1
            interval_ms = 60000

            [[switches.toggle.mqtt]]
            topic = "/mqtt/on"
            devices = [{ bridge_name = "hall", id = 1 }]

            [[switches.turn_on.telemetry]]
            code = "onDevid8"
            turn_off_delay_ms = 100
            devices = [{ bridge_name = "hall", id = 8 }]
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.overrides.get("lightswitch::engine"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
        assert_eq!(config.sensors.as_ref().unwrap().interval_ms, 60000);
        assert_eq!(config.switches.toggle.mqtt[0].topic, "/mqtt/on");
        assert_eq!(
            config.switches.turn_on.telemetry[0].options.turn_off_delay_ms,
            100
        );
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let toml = r#"
            [mqtt]
            broker = "localhost"

            [[bridges]]
            name = "hall"
            host = "192.168.1.20"
            user = "abc"

            [[bridges]]
            name = "hall"
            host = "192.168.1.21"
            user = "def"

            [sensors]
            bridge = "attic"
            dark_sensor_id = 5
            daylight_sensor_id = 1
            interval_ms = 50

            [[switches.turn_off.telemetry]]
            code = ""
            devices = [{ bridge_name = "garage", id = 3 }, { bridge_name = "garage", id = 4 }]
        "#;

        let err = toml.parse::<Config>().unwrap_err();
        match &err {
            ConfigError::Invalid(problems) => assert_eq!(problems.len(), 5),
            other => panic!("expected validation error, got {:?}", other),
        }
        insta::assert_snapshot!(
            err.to_string(),
            @"Invalid configuration: bridge 'hall' is defined more than once; sensors.bridge refers to unknown bridge 'attic'; sensors.interval_ms must be greater than 100; switch device refers to unknown bridge 'garage'; switch code must not be empty"
        );
    }

    #[test]
    fn test_parse_error() {
        let err = "[mqtt\nbroker =".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mqtt.broker, "localhost");
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_log_level_to_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::INFO);
    }
}
