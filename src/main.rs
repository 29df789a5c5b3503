//! mopidy-mqtt - MQTT bridge for Mopidy
//!
//! Usage:
//!   mopidy-mqtt [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Configuration file path
//!       --host <HOST>        MQTT broker host
//!   -p, --port <PORT>        MQTT broker port
//!   -t, --topic <TOPIC>      Base topic
//!       --mopidy-url <URL>   Mopidy WebSocket endpoint
//!   -l, --log-level          Log level (error, warn, info, debug, trace)
//!   -h, --help               Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mopidy_mqtt::bridge::{CommandRouter, EventPublisher, Topics};
use mopidy_mqtt::bus::MqttClient;
use mopidy_mqtt::config::Config;
use mopidy_mqtt::player::MopidyClient;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// mopidy-mqtt - MQTT bridge for Mopidy
#[derive(Parser, Debug)]
#[command(name = "mopidy-mqtt")]
#[command(author = "mopidy-mqtt Contributors")]
#[command(version)]
#[command(about = "Control Mopidy over MQTT and publish what it is playing")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    host: Option<String>,

    /// MQTT broker port
    #[arg(short, long)]
    port: Option<u16>,

    /// Base topic, e.g. home/livingroom
    #[arg(short, long)]
    topic: Option<String>,

    /// Mopidy WebSocket endpoint
    #[arg(long)]
    mopidy_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.mqtt.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mqtt.port = port;
        }
        if let Some(topic) = &self.topic {
            config.mqtt.topic = topic.clone();
        }
        if let Some(url) = &self.mopidy_url {
            config.mopidy.url = url.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // CLI args override file config
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // CLI overrides config, config overrides default (info)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let topics = Topics::new(config.mqtt.topic.clone());

    info!("Starting mopidy-mqtt");
    info!("  Broker: {}", config.mqtt.address());
    info!("  Base topic: {}", topics.base());
    info!(
        "  Authentication: {}",
        if config.mqtt.credentials().is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!("  Mopidy: {}", config.mopidy.url);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let player = MopidyClient::spawn(config.mopidy.clone(), events_tx);

    let router = Arc::new(CommandRouter::new(player.clone(), topics.clone()));
    let mqtt = MqttClient::spawn(config.mqtt.clone(), topics.inbound(), router);

    let publisher = EventPublisher::new(mqtt.clone(), player.clone(), topics);
    let publisher_task = tokio::spawn(publisher.run(events_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    mqtt.shutdown().await;
    player.shutdown().await;

    // The player's event sender is gone once its task has stopped
    if tokio::time::timeout(std::time::Duration::from_secs(1), publisher_task)
        .await
        .is_err()
    {
        warn!("Event publisher did not stop in time");
    }

    Ok(())
}
