//! # Connector Configuration
//!
//! Layered configuration for both bridges, built with the `config` crate:
//! serde defaults, then an optional TOML file, then `BPM_CONNECTOR_*`
//! environment variables (`__` separates sections, e.g.
//! `BPM_CONNECTOR_RABBITMQ__QUEUE_OUT`).

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{BridgeError, BridgeResult};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BPM_CONNECTOR";

/// Environment variable naming a configuration file
pub const CONFIG_PATH_ENV: &str = "BPM_CONNECTOR_CONFIG_PATH";

/// Key fragments whose values are masked in printed configuration
const SENSITIVE_KEYS: [&str; 3] = ["pass", "password", "secret"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub camunda: CamundaConfig,
    pub rabbitmq: RabbitMqConfig,
    pub logging: LoggingConfig,
}

/// Process engine connection and external-task settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CamundaConfig {
    /// REST API base, e.g. `http://camunda:8080/engine-rest`
    pub api_url: String,
    pub api_login: Option<String>,
    pub api_pass: Option<String>,
    /// Topic this worker fetches from
    pub topic: String,
    /// Handler bound to `topic` at startup
    pub handler: String,
    /// Defaults to `worker<pid>`
    pub worker_id: Option<String>,
    pub lock_duration_ms: u64,
    /// Sleep between fetch cycles
    pub tick_interval_ms: u64,
    /// Default for the `retries` parameter
    pub retries: i64,
    /// Default for the `retryTimeout` parameter
    pub retry_timeout_ms: i64,
    pub request_timeout_ms: u64,
}

impl Default for CamundaConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/engine-rest".to_string(),
            api_login: None,
            api_pass: None,
            topic: "connector".to_string(),
            handler: "publish_envelope".to_string(),
            worker_id: None,
            lock_duration_ms: 600_000,
            tick_interval_ms: 1_000,
            retries: 0,
            retry_timeout_ms: 1_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl CamundaConfig {
    /// Worker identity reported to the engine and stamped into envelopes
    pub fn worker_id(&self) -> String {
        self.worker_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("worker{}", std::process::id()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Broker connection and queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Default vhost; also the default of the `vhost` parameter
    pub vhost: String,
    /// Queue consumed by the outbound bridge; default `response_to`
    pub queue_out: String,
    /// Queue consumed by the demo consumer
    pub queue_in: String,
    pub reconnect_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    pub heartbeat_seconds: u16,
    pub prefetch_count: u16,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            pass: "guest".to_string(),
            vhost: "/".to_string(),
            queue_out: "bpm_out".to_string(),
            queue_in: "bpm_in".to_string(),
            reconnect_timeout_ms: 5_000,
            connection_timeout_ms: 3_000,
            heartbeat_seconds: 60,
            prefetch_count: 1,
        }
    }
}

impl RabbitMqConfig {
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }

    /// Connection address without credentials, for logs
    pub fn redacted_address(&self, vhost: &str) -> String {
        format!("amqp://{}@{}:{}/{}", self.user, self.host, self.port, vhost)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overrides the environment default level; `RUST_LOG` overrides both
    pub level: Option<String>,
    pub json: bool,
}

impl BridgeConfig {
    /// Load from an optional file (falling back to `BPM_CONNECTOR_CONFIG_PATH`)
    /// and the environment, then validate
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut builder = config::Config::builder();
        if let Some(path) = &path {
            debug!(path = %path.display(), "Loading connector configuration file");
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations neither bridge can run with
    pub fn validate(&self) -> BridgeResult<()> {
        Url::parse(&self.camunda.api_url).map_err(|e| {
            BridgeError::configuration(format!(
                "camunda.api_url `{}` is not a valid URL: {}",
                self.camunda.api_url, e
            ))
        })?;

        let required = [
            ("camunda.topic", &self.camunda.topic),
            ("camunda.handler", &self.camunda.handler),
            ("rabbitmq.host", &self.rabbitmq.host),
            ("rabbitmq.vhost", &self.rabbitmq.vhost),
            ("rabbitmq.queue_out", &self.rabbitmq.queue_out),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(BridgeError::configuration(format!("{key} must not be empty")));
            }
        }

        if self.camunda.lock_duration_ms == 0 {
            return Err(BridgeError::configuration(
                "camunda.lock_duration_ms must be greater than zero",
            ));
        }
        if self.rabbitmq.prefetch_count == 0 {
            return Err(BridgeError::configuration(
                "rabbitmq.prefetch_count must be at least 1",
            ));
        }
        if self.camunda.api_login.is_some() != self.camunda.api_pass.is_some() {
            return Err(BridgeError::configuration(
                "camunda.api_login and camunda.api_pass must be set together",
            ));
        }

        Ok(())
    }

    /// Configuration as JSON with credentials masked
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        mask_sensitive(&mut value);
        value
    }
}

fn mask_sensitive(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let key = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|pattern| key.contains(pattern)) && !entry.is_null() {
                    *entry = serde_json::Value::String("***".to_string());
                } else {
                    mask_sensitive(entry);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camunda.lock_duration_ms, 600_000);
        assert_eq!(config.camunda.retry_timeout_ms, 1_000);
        assert_eq!(config.rabbitmq.prefetch_count, 1);
    }

    #[test]
    fn test_worker_id_defaults_to_pid() {
        let config = CamundaConfig::default();
        assert_eq!(config.worker_id(), format!("worker{}", std::process::id()));

        let named = CamundaConfig {
            worker_id: Some("w1".to_string()),
            ..CamundaConfig::default()
        };
        assert_eq!(named.worker_id(), "w1");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.camunda.api_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().is_fatal());

        let mut config = BridgeConfig::default();
        config.rabbitmq.queue_out = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rabbitmq.queue_out"));

        let mut config = BridgeConfig::default();
        config.camunda.api_login = Some("demo".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camunda]
api_url = "http://camunda:8080/engine-rest"
topic = "shipping"
retries = 3

[rabbitmq]
host = "rabbit"
queue_out = "outcomes"
"#
        )
        .unwrap();

        let config = BridgeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.camunda.topic, "shipping");
        assert_eq!(config.camunda.retries, 3);
        assert_eq!(config.rabbitmq.host, "rabbit");
        assert_eq!(config.rabbitmq.queue_out, "outcomes");
        // untouched values keep their defaults
        assert_eq!(config.rabbitmq.port, 5672);
        assert_eq!(config.camunda.handler, "publish_envelope");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = BridgeConfig::load(Some(Path::new("/nonexistent/bpm-connector.toml")))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_sanitized_masks_credentials() {
        let mut config = BridgeConfig::default();
        config.camunda.api_login = Some("demo".to_string());
        config.camunda.api_pass = Some("hunter2".to_string());

        let sanitized = config.sanitized();
        assert_eq!(sanitized["camunda"]["api_pass"], "***");
        assert_eq!(sanitized["camunda"]["api_login"], "demo");
        assert_eq!(sanitized["rabbitmq"]["pass"], "***");
        assert_eq!(sanitized["rabbitmq"]["user"], "guest");
    }
}
