//! Configuration management for PulseWatch

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerting::OperatorAliases;
use crate::error::Result;

/// Environment variable prefix, e.g. `PULSEWATCH__SERVER__PORT=9090`
pub const ENV_PREFIX: &str = "PULSEWATCH";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Monitor fetch configuration
    pub monitor: MonitorConfig,

    /// Dispatch worker configuration
    pub dispatch: DispatchConfig,

    /// Alerting configuration
    pub alerting: AlertingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Later sources override earlier ones. The file format is picked from
    /// its extension.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// HTTP API port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,
    /// Maximum connections
    pub max_connections: usize,
    /// Hash holding registered notifications
    pub registry_key: String,
    /// List holding pending deliveries
    pub queue_key: String,
    /// Hash holding monitor and trigger histories
    pub status_key: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            max_connections: 10,
            registry_key: "noti_reg".to_string(),
            queue_key: "noti_queue".to_string(),
            status_key: "monitor_status".to_string(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Capacity of the fired-job channel
    pub channel_capacity: usize,
    /// Maximum number of job executions running at once
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            workers: 32,
        }
    }
}

/// Monitor fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Timeout for a single resource fetch
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Dispatch worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a single blocking pop waits before re-checking for shutdown
    #[serde(with = "humantime_serde")]
    pub pop_timeout: Duration,
    /// Timeout for outgoing Slack and webhook requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Slack chat API endpoint
    pub slack_api_url: String,
    /// Skip TLS certificate verification for SMTP servers
    pub smtp_accept_invalid_certs: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            slack_api_url: "https://slack.com/api/chat.postMessage".to_string(),
            smtp_accept_invalid_certs: false,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Which operator alias table trigger conditions use
    pub operator_aliases: OperatorAliases,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
