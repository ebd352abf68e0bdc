//! Configuration for conductor-daemon

use crate::execution::RunDefaults;
use conductor_types::DEFAULT_MAX_CONCURRENT;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Execution API configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Admission settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Queue drainer configuration
    #[serde(default)]
    pub drainer: DrainerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgREST-compatible REST store
    Rest {
        /// Base URL, without the `/rest/v1` suffix
        url: String,

        /// Service key sent as `apikey` and bearer token
        service_key: String,

        /// Per-request timeout in seconds
        #[serde(default = "default_store_timeout")]
        timeout_secs: u64,
    },

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    /// Backend name, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Rest { .. } => "rest",
            StorageConfig::Postgres { .. } => "postgres",
        }
    }
}

/// Execution API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Base URL of the execution API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,

    /// Fixed parameters sent with every run
    #[serde(default)]
    pub defaults: RunDefaults,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_execution_timeout(),
            defaults: RunDefaults::default(),
        }
    }
}

/// Admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Cap used when the store holds no valid `max_concurrent` entry
    #[serde(default = "default_max_concurrent")]
    pub default_max_concurrent: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Queue drainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainerConfig {
    /// Run the background drain loop
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between periodic drain passes
    #[serde(default = "default_drain_interval")]
    pub interval_secs: u64,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_drain_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_store_timeout() -> u64 {
    10
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_api_url() -> String {
    "https://integrations-api.composio.io".to_string()
}

fn default_execution_timeout() -> u64 {
    30
}

fn default_max_concurrent() -> i64 {
    DEFAULT_MAX_CONCURRENT
}

fn default_drain_interval() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `CONDUCTOR_*` variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // e.g. CONDUCTOR_EXECUTION__API_URL
        builder = builder.add_source(
            config::Environment::with_prefix("CONDUCTOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.dispatch.default_max_concurrent, 8);
        assert_eq!(config.execution.api_url, "https://integrations-api.composio.io");
        assert_eq!(config.execution.defaults.timeout_hours, 36);
    }

    #[test]
    fn test_drainer_defaults() {
        let config = DrainerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 15);
    }

    #[test]
    fn test_storage_tagged() {
        let config: StorageConfig = serde_json::from_value(serde_json::json!({
            "type": "rest",
            "url": "https://db.example.com",
            "service_key": "sk"
        }))
        .unwrap();
        assert!(matches!(
            config,
            StorageConfig::Rest { timeout_secs: 10, ref url, .. } if url == "https://db.example.com"
        ));
    }

    #[test]
    fn test_load_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.drainer.interval_secs, 15);
        assert_eq!(config.execution.defaults.model_provider, "claude");
    }
}
