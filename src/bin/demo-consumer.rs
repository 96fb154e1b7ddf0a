//! # Demo Consumer
//!
//! Sample downstream worker: reads envelopes from `rabbitmq.queue_in` and
//! echoes them to `rabbitmq.queue_out` with a fixed `success` header.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::EchoWorker;
use bpm_connector::constants::owners;
use bpm_connector::logging;
use bpm_connector::messaging::providers::RabbitMqConnector;
use bpm_connector::shutdown;

#[derive(Parser)]
#[command(name = "demo-consumer")]
#[command(about = "Echo inbound envelopes back to the outbound queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, env = "BPM_CONNECTOR_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Report every task as succeeded instead of failed
    #[arg(long)]
    success: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init_structured_logging(&config.logging);

    info!(
        "🚀 Starting {}: {} -> {} (success = {})",
        owners::CONSUMER,
        config.rabbitmq.queue_in,
        config.rabbitmq.queue_out,
        cli.success
    );

    let connector = RabbitMqConnector::new(config.rabbitmq.clone(), owners::CONSUMER);
    let worker = EchoWorker::new(connector, &config, cli.success);

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::wait_for_os_signal().await;
        trigger.trigger();
    });

    worker.run(signal).await?;
    Ok(())
}
