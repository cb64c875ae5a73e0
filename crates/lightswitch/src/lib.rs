pub mod config;
mod engine;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::CombinedMessage;
pub use engine::Command;
pub use engine::CommandReceiver;
pub use engine::CommandSender;
pub use engine::DecodeError;
pub use engine::DeviceTarget;
pub use engine::Engine;
pub use engine::Event;
pub use engine::RawMessage;
pub use engine::Scheduler;
pub use engine::SensorState;
pub use engine::Shutdown;
pub use engine::TELEMETRY_TOPIC;
pub use engine::TelemetryMessage;
pub use engine::combine_with_state;
