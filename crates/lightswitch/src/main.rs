use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lightswitch::Config;
use lightswitch::Engine;
use lightswitch::Shutdown;
use lightswitch::config::LoggingConfig;
use lightswitch::integrations::hue::ActionProcessor;
use lightswitch::integrations::hue::HueBridges;
use lightswitch::integrations::hue::SensorStateUpdater;
use lightswitch::integrations::mqtt::MqttSource;
use lightswitch::integrations::mqtt::RumqttcClient;
use tokio::sync::mpsc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Capacity for the broker→engine message channel
const MESSAGE_CHANNEL_SIZE: usize = 1024;

/// Sensor readings are sparse; only the latest one matters
const STATE_CHANNEL_SIZE: usize = 16;

/// How long to wait for in-flight commands to reach the bridges on exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "lightswitchd")]
#[command(about = "Turns MQTT and RF remote events into Hue light commands")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(default_value = "lightswitchd.toml")]
    config: PathBuf,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = Targets::new()
        .with_default(LevelFilter::from(logging.level))
        .with_targets(
            logging
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    init_logging(&config.logging);

    tracing::info!("lightswitchd starting");
    tracing::info!("Loaded config from: {}", cli.config.display());

    let shutdown = Shutdown::new();
    let bridges = HueBridges::new(&config.bridges).context("Failed to create Hue client")?;

    let (state_tx, state_rx) = mpsc::channel(STATE_CHANNEL_SIZE);
    match &config.sensors {
        Some(sensors) => {
            let reader = bridges
                .sensors(sensors)
                .context("Failed to set up sensor state updater")?;
            let updater =
                SensorStateUpdater::new(reader, Duration::from_millis(sensors.interval_ms));
            tokio::spawn(updater.run(state_tx, shutdown.clone()));
            tracing::info!(
                "Polling sensors on bridge '{}' every {}ms",
                sensors.bridge,
                sensors.interval_ms
            );
        }
        None => {
            tracing::info!(
                "No sensors configured, gated turn-on switches see dark=false daylight=false"
            );
            drop(state_tx);
        }
    }

    let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_SIZE);
    let source = MqttSource::new(RumqttcClient::new(&config.mqtt));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = source.run(message_tx, shutdown).await {
                tracing::error!("MQTT source failed: {}", e);
            }
        });
    }
    tracing::info!(
        "Connecting to MQTT broker at {}:{}",
        config.mqtt.broker,
        config.mqtt.port
    );

    let engine = Engine::new(config.switches);
    let commands = engine.run(message_rx, state_rx, &shutdown);
    let processor = tokio::spawn(ActionProcessor::new(bridges).run(commands));

    tracing::info!("lightswitchd running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down...");
    shutdown.trigger();

    match tokio::time::timeout(DRAIN_TIMEOUT, processor).await {
        Ok(Ok(())) => tracing::info!("All commands dispatched"),
        Ok(Err(e)) => tracing::error!("Action processor task failed: {}", e),
        Err(_) => tracing::warn!("Timed out waiting for pending commands"),
    }

    Ok(())
}
