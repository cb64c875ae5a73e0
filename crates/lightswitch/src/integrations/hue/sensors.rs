use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::client::HueBridges;
use super::client::HueError;
use super::client::api_url;
use super::client::get_json;
use crate::config::BridgeConfig;
use crate::config::SensorConfig;
use crate::engine::SensorState;
use crate::engine::Shutdown;

/// Source of dark/daylight readings
#[async_trait]
pub trait SensorReader: Send + Sync {
    async fn read_state(&self) -> Result<SensorState, HueError>;
}

/// Reads the dark and daylight sensors from one bridge's sensor list
pub struct HueSensors {
    http: reqwest::Client,
    bridge: BridgeConfig,
    dark_sensor_id: u32,
    daylight_sensor_id: u32,
}

impl HueBridges {
    pub fn sensors(&self, config: &SensorConfig) -> Result<HueSensors, HueError> {
        Ok(HueSensors {
            http: self.http().clone(),
            bridge: self.bridge(&config.bridge)?.clone(),
            dark_sensor_id: config.dark_sensor_id,
            daylight_sensor_id: config.daylight_sensor_id,
        })
    }
}

#[async_trait]
impl SensorReader for HueSensors {
    async fn read_state(&self) -> Result<SensorState, HueError> {
        let sensors = get_json(&self.http, &api_url(&self.bridge, "sensors")).await?;

        Ok(SensorState::new(
            sensor_flag(&sensors, self.dark_sensor_id, "dark")?,
            sensor_flag(&sensors, self.daylight_sensor_id, "daylight")?,
        ))
    }
}

/// `state.<field>` of sensor `id`; a sensor without the field reads as false.
fn sensor_flag(sensors: &Value, id: u32, field: &str) -> Result<bool, HueError> {
    let sensor = sensors
        .get(id.to_string())
        .ok_or(HueError::MissingSensor(id))?;

    Ok(sensor
        .get("state")
        .and_then(|state| state.get(field))
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Polls a [`SensorReader`] on a fixed interval and publishes each reading.
pub struct SensorStateUpdater<R: SensorReader> {
    reader: R,
    interval: Duration,
}

impl<R: SensorReader> SensorStateUpdater<R> {
    pub fn new(reader: R, interval: Duration) -> Self {
        Self { reader, interval }
    }

    /// Poll until shutdown fires or nobody is listening. The first poll
    /// happens immediately; failed polls are logged and skipped.
    pub async fn run(self, tx: mpsc::Sender<SensorState>, shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.reader.read_state().await {
                Ok(state) => {
                    info!(
                        "Sensor state: dark={} daylight={}",
                        state.is_dark, state.is_daylight
                    );
                    if tx.send(state).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Reading sensor state failed: {}", e),
            }
        }

        debug!("Sensor state updater stopped");
    }
}
