use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;

use super::client::MqttClient;
use super::client::MqttError;
use crate::engine::RawMessage;
use crate::engine::Shutdown;

/// Every topic on the broker is forwarded; rules pick what they need
pub const SUBSCRIBE_ALL: &str = "#";

/// Feeds every broker publish into the engine as a [`RawMessage`].
pub struct MqttSource<C: MqttClient> {
    client: C,
}

impl<C: MqttClient> MqttSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Connect, subscribe to everything and forward messages until shutdown
    /// fires, the client stops, or the engine stops listening.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<RawMessage>,
        shutdown: Shutdown,
    ) -> Result<(), MqttError> {
        self.client.connect().await?;
        self.client.subscribe(SUBSCRIBE_ALL).await?;
        info!("Subscribed to MQTT topic {}", SUBSCRIBE_ALL);

        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = self.client.poll_message() => match msg {
                    Some(msg) => msg,
                    None => {
                        info!("MQTT client stopped");
                        break;
                    }
                },
            };

            let message = RawMessage::new(msg.topic, String::from_utf8_lossy(&msg.payload));
            debug!("Received message on topic {}: {}", message.topic, message.payload);

            if tx.send(message).await.is_err() {
                break;
            }
        }

        Ok(())
    }
}
