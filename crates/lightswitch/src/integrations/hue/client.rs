//! Hue bridge client over the local v1 REST API.
//!
//! The v1 API reports failures in the response body, with a 200 status, as
//! an array of `{"error": {...}}` objects.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::info;

use crate::config::BridgeConfig;
use crate::engine::DeviceTarget;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum HueError {
    #[error("Unknown bridge '{0}'")]
    UnknownBridge(String),

    #[error("HTTP request to bridge failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bridge returned an error: {0}")]
    Api(String),

    #[error("Bridge response has no '{0}' field")]
    MissingField(&'static str),

    #[error("Sensor {0} not found on bridge")]
    MissingSensor(u32),
}

/// Device control on a lighting bridge
///
/// This trait allows for mocking the bridge for testing purposes
#[async_trait]
pub trait BridgeClient: Send + Sync {
    async fn turn_on(&self, device: &DeviceTarget) -> Result<(), HueError>;

    async fn turn_off(&self, device: &DeviceTarget) -> Result<(), HueError>;

    /// Read the current on/off state and send its negation
    async fn toggle(&self, device: &DeviceTarget) -> Result<(), HueError>;
}

/// Every configured bridge, addressed by name
pub struct HueBridges {
    http: reqwest::Client,
    bridges: HashMap<String, BridgeConfig>,
}

impl HueBridges {
    pub fn new(bridges: &[BridgeConfig]) -> Result<Self, HueError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            bridges: bridges
                .iter()
                .map(|b| (b.name.clone(), b.clone()))
                .collect(),
        })
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn bridge(&self, name: &str) -> Result<&BridgeConfig, HueError> {
        self.bridges
            .get(name)
            .ok_or_else(|| HueError::UnknownBridge(name.to_string()))
    }

    async fn set_on(&self, device: &DeviceTarget, on: bool) -> Result<(), HueError> {
        let bridge = self.bridge(&device.bridge_name)?;
        let url = command_url(bridge, device);
        debug!("PUT {} on={}", url, on);

        let body: Value = self
            .http
            .put(&url)
            .json(&json!({ "on": on }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        check_api_error(&body)
    }

    async fn is_on(&self, device: &DeviceTarget) -> Result<bool, HueError> {
        let bridge = self.bridge(&device.bridge_name)?;
        let url = resource_url(bridge, device);
        debug!("GET {}", url);

        let body = get_json(&self.http, &url).await?;
        read_on(&body, device.is_group)
    }
}

#[async_trait]
impl BridgeClient for HueBridges {
    async fn turn_on(&self, device: &DeviceTarget) -> Result<(), HueError> {
        info!("Turning on {}", device);
        self.set_on(device, true).await
    }

    async fn turn_off(&self, device: &DeviceTarget) -> Result<(), HueError> {
        info!("Turning off {}", device);
        self.set_on(device, false).await
    }

    async fn toggle(&self, device: &DeviceTarget) -> Result<(), HueError> {
        let on = !self.is_on(device).await?;
        info!("Switching {} to on={}", device, on);
        self.set_on(device, on).await
    }
}

pub(super) async fn get_json(http: &reqwest::Client, url: &str) -> Result<Value, HueError> {
    let body: Value = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    check_api_error(&body)?;
    Ok(body)
}

pub(super) fn api_url(bridge: &BridgeConfig, path: &str) -> String {
    format!("http://{}/api/{}/{}", bridge.host, bridge.user, path)
}

fn resource_url(bridge: &BridgeConfig, device: &DeviceTarget) -> String {
    let kind = if device.is_group { "groups" } else { "lights" };
    api_url(bridge, &format!("{}/{}", kind, device.id))
}

fn command_url(bridge: &BridgeConfig, device: &DeviceTarget) -> String {
    let endpoint = if device.is_group { "action" } else { "state" };
    format!("{}/{}", resource_url(bridge, device), endpoint)
}

/// Turn the first `{"error": {...}}` entry of a response array into an error.
fn check_api_error(body: &Value) -> Result<(), HueError> {
    let Some(entries) = body.as_array() else {
        return Ok(());
    };

    match entries.iter().find_map(|entry| entry.get("error")) {
        Some(error) => {
            let description = error
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Err(HueError::Api(description))
        }
        None => Ok(()),
    }
}

/// Lights report `state.on`, groups report `state.any_on`.
fn read_on(body: &Value, is_group: bool) -> Result<bool, HueError> {
    let field = if is_group { "any_on" } else { "on" };
    body.get("state")
        .and_then(|state| state.get(field))
        .and_then(Value::as_bool)
        .ok_or(HueError::MissingField(field))
}
