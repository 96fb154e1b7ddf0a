//! # Connector In
//!
//! Inbound bridge process: claims external tasks on the configured topic and
//! publishes one envelope per task.
//!
//! ## Usage
//!
//! ```bash
//! connector-in --config config/connector.toml
//! BPM_CONNECTOR_CAMUNDA__TOPIC=shipping connector-in
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use bpm_connector::camunda::CamundaApiClient;
use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::InboundBridge;
use bpm_connector::constants::owners;
use bpm_connector::logging;
use bpm_connector::messaging::providers::RabbitMqConnector;
use bpm_connector::messaging::SessionPool;
use bpm_connector::shutdown;

#[derive(Parser)]
#[command(name = "connector-in")]
#[command(about = "Publish Camunda external tasks to RabbitMQ")]
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

    info!("🚀 Starting {} v{}", owners::CONNECTOR_IN, env!("CARGO_PKG_VERSION"));
    info!(
        "   Camunda: {} topic <{}>",
        config.camunda.api_url, config.camunda.topic
    );
    info!(
        "   RabbitMQ: {}",
        config.rabbitmq.redacted_address(&config.rabbitmq.vhost)
    );

    let engine = CamundaApiClient::new(&config.camunda)?;
    let publisher = SessionPool::new(RabbitMqConnector::new(
        config.rabbitmq.clone(),
        owners::CONNECTOR_IN,
    ));
    let bridge = InboundBridge::new(engine, publisher, &config)?;

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        shutdown::wait_for_os_signal().await;
        info!("🛑 Shutdown signal received, finishing current task...");
        trigger.trigger();
    });

    let result = bridge.run(signal).await;
    bridge.publisher().close_all().await;

    if let Err(e) = result {
        error!(fault = %e.fault_class(), "Inbound bridge aborted: {}", e);
        process::exit(1);
    }

    info!("👋 {} shutdown complete", owners::CONNECTOR_IN);
    Ok(())
}
