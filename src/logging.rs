//! # Structured Logging Module
//!
//! Environment-aware structured logging for the connector processes. Console
//! output is either human-readable or JSON lines; `RUST_LOG` always wins over
//! the configured level.

use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment));

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let result = if config.json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true).with_current_span(false))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init()
        };

        // A subscriber installed by a test harness is fine to keep
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %log_level,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("BPM_CONNECTOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" | "staging" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log one bridge event: a fetched task, a published envelope, a resolution
pub fn log_bridge_operation(
    owner: &str,
    operation: &str,
    queue: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        owner = %owner,
        operation = %operation,
        queue = queue,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📨 BRIDGE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(owner: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        owner = %owner,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
