mod client;
mod dispatch;
mod sensors;

pub use client::BridgeClient;
pub use client::HueBridges;
pub use client::HueError;
pub use dispatch::ActionProcessor;
pub use sensors::HueSensors;
pub use sensors::SensorReader;
pub use sensors::SensorStateUpdater;
