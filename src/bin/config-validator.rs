//! # Connector Configuration Validator
//!
//! Loads a configuration the same way the bridges do, validates it and prints
//! the effective values with credentials masked.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use bpm_connector::config::BridgeConfig;
use bpm_connector::connector::{ParameterRegistry, TopicBinding};

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate BPM connector configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, env = "BPM_CONNECTOR_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the effective configuration as JSON
    #[arg(long)]
    show: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match validate(&cli) {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            println!("❌ {}", e);
            process::exit(1);
        }
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating BPM Connector Configuration");
    if let Some(path) = &cli.config {
        println!("Config File: {}", path.display());
    }
    println!();

    let config = BridgeConfig::load(cli.config.as_deref())?;
    println!("✅ Configuration loaded and validated");

    let binding = TopicBinding::from_config(&config.camunda)?;
    println!(
        "✅ Topic <{}> bound to handler <{}>",
        binding.topic(),
        binding.handler()
    );

    let registry = ParameterRegistry::standard(&config);
    println!("✅ Task parameters:");
    for descriptor in registry.descriptors() {
        let default = descriptor
            .default
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "   {:<18} required: {:<5} default: {}",
            descriptor.name, descriptor.required, default
        );
    }

    if cli.show || cli.verbose > 0 {
        println!();
        println!("{}", serde_json::to_string_pretty(&config.sanitized())?);
    }

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}
