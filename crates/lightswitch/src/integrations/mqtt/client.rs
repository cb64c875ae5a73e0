use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("MQTT client not connected. Call connect() first.")]
    NotConnected,

    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), MqttError>;

    /// Subscribe to an MQTT topic filter
    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError>;

    /// Poll for the next message from subscribed topics
    ///
    /// Returns None if the client should stop
    async fn poll_message(&mut self) -> Option<MqttMessage>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub messages: std::collections::VecDeque<MqttMessage>,
    pub subscriptions: Vec<String>,
    pub is_connected: bool,
    /// Park instead of ending once the queue is empty, like a live connection
    pub hold_open: bool,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), MqttError> {
        self.is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        if !self.is_connected {
            return Err(MqttError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match self.messages.pop_front() {
            Some(msg) => Some(msg),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message, delivered in insertion order
    pub fn add_message(&mut self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.messages.push_back(MqttMessage {
            topic: topic.to_string(),
            payload: payload.into(),
        });
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        // Keep the broker-side session so the subscription survives reconnects
        mqtt_options.set_clean_session(false);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), MqttError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        // rumqttc reconnects on the next poll after an error
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        tracing::info!(
                            "Connected to MQTT broker (session present: {})",
                            ack.session_present
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;
        client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
