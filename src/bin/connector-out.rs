//! # Connector Out
//!
//! Outbound bridge process: consumes outcome envelopes and resolves the
//! external tasks they refer to.
//!
//! ## Usage
//!
//! ```bash
//! connector-out --config config/connector.toml
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use bpm_connector::camunda::CamundaApiClient;
use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::OutboundBridge;
use bpm_connector::constants::owners;
use bpm_connector::logging;
use bpm_connector::messaging::providers::RabbitMqConnector;
use bpm_connector::shutdown;

#[derive(Parser)]
#[command(name = "connector-out")]
#[command(about = "Resolve Camunda external tasks from RabbitMQ outcome messages")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, env = "BPM_CONNECTOR_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init_structured_logging(&config.logging);

    info!("🚀 Starting {} v{}", owners::CONNECTOR_OUT, env!("CARGO_PKG_VERSION"));
    info!("   Camunda: {}", config.camunda.api_url);
    info!(
        "   RabbitMQ: {} queue <{}>",
        config.rabbitmq.redacted_address(&config.rabbitmq.vhost),
        config.rabbitmq.queue_out
    );

    let engine = CamundaApiClient::new(&config.camunda)?;
    let connector = RabbitMqConnector::new(config.rabbitmq.clone(), owners::CONNECTOR_OUT);
    let bridge = OutboundBridge::new(engine, connector, &config);

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::wait_for_os_signal().await;
        info!("🛑 Shutdown signal received, finishing current message...");
        trigger.trigger();
    });

    if let Err(e) = bridge.run(signal).await {
        error!(fault = %e.fault_class(), "Outbound bridge aborted: {}", e);
        process::exit(1);
    }

    info!("👋 {} shutdown complete", owners::CONNECTOR_OUT);
    Ok(())
}
