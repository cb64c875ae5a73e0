use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::combine::combine_with_state;
use super::event::CombinedMessage;
use super::event::Event;
use super::event::TelemetryMessage;
use super::message::Command;
use super::message::DeviceTarget;
use super::message::RawMessage;
use super::scheduler::Scheduler;
use super::shutdown::Shutdown;
use super::state::SensorState;
use crate::config::Switches;

/// Channel types for commands FROM the engine TO the bridge integration
pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

/// Capacity for every stage channel, including the merged command output
/// Provides backpressure when the bridge is slower than the broker
const STAGE_CHANNEL_SIZE: usize = 1024;

/// lightswitch engine
///
/// Classifies combined messages, matches them against the configured switches
/// and merges everything the rules produce into a single command stream.
/// Turn-on rules with a delay arm a per-device turn-off on the scheduler.
pub struct Engine {
    switches: Arc<Switches>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(switches: Switches) -> Self {
        Self {
            switches: Arc::new(switches),
            scheduler: Scheduler::new(),
        }
    }

    /// Combine raw messages with sensor state, then run the rule pipeline.
    pub fn run(
        &self,
        messages: mpsc::Receiver<RawMessage>,
        states: mpsc::Receiver<SensorState>,
        shutdown: &Shutdown,
    ) -> CommandReceiver {
        let combined = combine_with_state(messages, states, shutdown);
        self.start(combined, shutdown)
    }

    /// Spawn the pipeline stages over an already combined stream.
    ///
    /// The returned stream ends once `input` has ended and shutdown has
    /// fired. Pending turn-offs are cancelled on shutdown and never emitted.
    pub fn start(
        &self,
        input: mpsc::Receiver<CombinedMessage>,
        shutdown: &Shutdown,
    ) -> CommandReceiver {
        let (commands_tx, commands_rx) = mpsc::channel(STAGE_CHANNEL_SIZE);
        let (plain_tx, plain_rx) = mpsc::channel(STAGE_CHANNEL_SIZE);
        let (toggle_tx, toggle_rx) = mpsc::channel(STAGE_CHANNEL_SIZE);
        let (turn_on_tx, turn_on_rx) = mpsc::channel(STAGE_CHANNEL_SIZE);
        let (turn_off_tx, turn_off_rx) = mpsc::channel(STAGE_CHANNEL_SIZE);
        let (delayed_tx, delayed_rx) = mpsc::unbounded_channel();

        tokio::spawn(classify(
            input,
            plain_tx,
            [toggle_tx, turn_on_tx, turn_off_tx],
        ));
        tokio::spawn(toggle_pass(
            self.switches.clone(),
            plain_rx,
            toggle_rx,
            commands_tx.clone(),
        ));
        tokio::spawn(turn_on_pass(
            self.switches.clone(),
            turn_on_rx,
            commands_tx.clone(),
            TurnOffArming {
                scheduler: self.scheduler.clone(),
                delayed: delayed_tx,
                shutdown: shutdown.clone(),
            },
        ));
        tokio::spawn(turn_off_pass(
            self.switches.clone(),
            turn_off_rx,
            commands_tx.clone(),
        ));
        tokio::spawn(delayed_source(
            self.scheduler.clone(),
            delayed_rx,
            commands_tx,
            shutdown.clone(),
        ));

        info!(
            "Engine started with {} toggle, {} turn-on and {} turn-off switches",
            self.switches.toggle.mqtt.len() + self.switches.toggle.telemetry.len(),
            self.switches.turn_on.mqtt.len() + self.switches.turn_on.telemetry.len(),
            self.switches.turn_off.mqtt.len() + self.switches.turn_off.telemetry.len(),
        );

        commands_rx
    }
}

/// Send a batch in order. Returns false once the consumer has gone away.
async fn emit(commands: &CommandSender, batch: Vec<Command>) -> bool {
    for command in batch {
        debug!("Emitting {}", command);
        if commands.send(command).await.is_err() {
            return false;
        }
    }
    true
}

/// Split the combined stream into plain messages and decoded telemetry.
///
/// Telemetry is copied to each of the three rule passes. A payload that does
/// not decode is dropped on its own.
async fn classify(
    mut input: mpsc::Receiver<CombinedMessage>,
    plain: mpsc::Sender<CombinedMessage>,
    telemetry: [mpsc::Sender<TelemetryMessage>; 3],
) {
    while let Some(combined) = input.recv().await {
        match Event::classify(combined) {
            Ok(Event::Plain(message)) => {
                if plain.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Event::Telemetry(message)) => {
                debug!("Telemetry code {} received", message.data);
                for tx in &telemetry {
                    if tx.send(message.clone()).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!("Dropping message: {}: {}", e, e.source),
        }
    }
}

async fn toggle_pass(
    switches: Arc<Switches>,
    mut plain: mpsc::Receiver<CombinedMessage>,
    mut telemetry: mpsc::Receiver<TelemetryMessage>,
    commands: CommandSender,
) {
    loop {
        let batch: Vec<Command> = tokio::select! {
            Some(combined) = plain.recv() => switches
                .toggle_plain(&combined.message)
                .cloned()
                .map(Command::Toggle)
                .collect(),
            Some(message) = telemetry.recv() => switches
                .toggle_telemetry(&message.data)
                .cloned()
                .map(Command::Toggle)
                .collect(),
            else => break,
        };

        if !emit(&commands, batch).await {
            break;
        }
    }
}

/// What a turn-on pass needs to arm a delayed turn-off
struct TurnOffArming {
    scheduler: Scheduler,
    delayed: mpsc::UnboundedSender<Command>,
    shutdown: Shutdown,
}

impl TurnOffArming {
    fn arm(&self, device: DeviceTarget, delay_ms: u64) {
        let delayed = self.delayed.clone();
        let target = device.clone();
        self.scheduler.arm(
            device,
            Duration::from_millis(delay_ms),
            move || {
                delayed
                    .send(Command::TurnOff(target))
                    .map_err(|_| anyhow::anyhow!("delayed command stream is closed"))
            },
            &self.shutdown,
        );
    }
}

async fn turn_on_pass(
    switches: Arc<Switches>,
    mut telemetry: mpsc::Receiver<TelemetryMessage>,
    commands: CommandSender,
    arming: TurnOffArming,
) {
    while let Some(message) = telemetry.recv().await {
        let hits: Vec<(DeviceTarget, u64)> = switches
            .turn_on_telemetry(&message)
            .flat_map(|rule| {
                rule.switch
                    .devices
                    .iter()
                    .map(|d| (d.clone(), rule.options.turn_off_delay_ms))
            })
            .collect();

        for (device, delay_ms) in hits {
            if !emit(&commands, vec![Command::TurnOn(device.clone())]).await {
                return;
            }
            if delay_ms > 0 {
                arming.arm(device, delay_ms);
            }
        }
    }
}

async fn turn_off_pass(
    switches: Arc<Switches>,
    mut telemetry: mpsc::Receiver<TelemetryMessage>,
    commands: CommandSender,
) {
    while let Some(message) = telemetry.recv().await {
        let batch = switches
            .turn_off_telemetry(&message.data)
            .cloned()
            .map(Command::TurnOff)
            .collect();

        if !emit(&commands, batch).await {
            break;
        }
    }
}

/// Forward turn-offs produced by fired timers until shutdown.
///
/// Stays open while idle, even with nothing armed, so the merged stream only
/// ends once shutdown has fired.
async fn delayed_source(
    scheduler: Scheduler,
    mut delayed: mpsc::UnboundedReceiver<Command>,
    commands: CommandSender,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            command = delayed.recv() => match command {
                Some(command) => {
                    if !emit(&commands, vec![command]).await {
                        break;
                    }
                }
                None => {
                    shutdown.cancelled().await;
                    break;
                }
            },
        }
    }

    scheduler.cancel_all();
    debug!("Delayed turn-off source stopped");
}
