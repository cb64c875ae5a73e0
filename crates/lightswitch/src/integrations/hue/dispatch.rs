use tracing::info;
use tracing::warn;

use super::client::BridgeClient;
use super::client::HueError;
use crate::engine::Command;
use crate::engine::CommandReceiver;

/// Applies engine commands to the bridges, one at a time and in order.
pub struct ActionProcessor<B: BridgeClient> {
    client: B,
}

impl<B: BridgeClient> ActionProcessor<B> {
    pub fn new(client: B) -> Self {
        Self { client }
    }

    pub async fn dispatch(&self, command: &Command) -> Result<(), HueError> {
        match command {
            Command::Toggle(device) => self.client.toggle(device).await,
            Command::TurnOn(device) => self.client.turn_on(device).await,
            Command::TurnOff(device) => self.client.turn_off(device).await,
        }
    }

    /// Drain the command stream. A failed command is logged and skipped.
    pub async fn run(self, mut commands: CommandReceiver) {
        let mut failed = 0usize;
        while let Some(command) = commands.recv().await {
            if let Err(e) = self.dispatch(&command).await {
                warn!("Failed to {}: {}", command, e);
                failed += 1;
            }
        }
        info!("Command stream ended ({} failed)", failed);
    }
}
