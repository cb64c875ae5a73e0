#[cfg(feature = "integration_hue")]
pub mod hue;
#[cfg(feature = "integration_mqtt")]
pub mod mqtt;
