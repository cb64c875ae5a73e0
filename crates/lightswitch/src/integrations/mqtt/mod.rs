mod client;
mod source;

pub use client::MqttClient;
pub use client::MqttError;
pub use client::MqttMessage;
pub use client::RumqttcClient;
pub use source::MqttSource;
pub use source::SUBSCRIBE_ALL;
