use tokio::sync::mpsc;
use tracing::debug;

use super::event::CombinedMessage;
use super::message::RawMessage;
use super::shutdown::Shutdown;
use super::state::SensorState;

/// Capacity of the combined-message channel
const COMBINED_CHANNEL_SIZE: usize = 1024;

/// Pair every raw message with the latest sensor state seen so far.
///
/// State updates are sampled: a message never waits for one. Updates that are
/// already queued when a message is taken are applied first. If the state
/// stream ends, combination continues with the last value. The output closes
/// when the message stream ends or shutdown fires.
pub fn combine_with_state(
    mut messages: mpsc::Receiver<RawMessage>,
    mut states: mpsc::Receiver<SensorState>,
    shutdown: &Shutdown,
) -> mpsc::Receiver<CombinedMessage> {
    let (tx, rx) = mpsc::channel(COMBINED_CHANNEL_SIZE);
    let shutdown = shutdown.clone();

    tokio::spawn(async move {
        let mut latest = SensorState::default();
        let mut states_open = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                state = states.recv(), if states_open => match state {
                    Some(state) => latest = state,
                    None => {
                        debug!("Sensor state stream ended, keeping {:?}", latest);
                        states_open = false;
                    }
                },

                message = messages.recv() => match message {
                    Some(message) => {
                        let combined = CombinedMessage { message, state: latest };
                        if tx.send(combined).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        debug!("Stream combiner stopped");
    });

    rx
}
