mod combine;
#[allow(clippy::module_inception)]
mod engine;
mod event;
mod message;
mod rules;
mod scheduler;
mod shutdown;
mod state;

pub use combine::combine_with_state;
pub use engine::CommandReceiver;
pub use engine::CommandSender;
pub use engine::Engine;
pub use event::CombinedMessage;
pub use event::DecodeError;
pub use event::Event;
pub use event::TELEMETRY_TOPIC;
pub use event::TelemetryMessage;
pub use message::Command;
pub use message::DeviceTarget;
pub use message::RawMessage;
pub use scheduler::Scheduler;
pub use shutdown::Shutdown;
pub use state::SensorState;
