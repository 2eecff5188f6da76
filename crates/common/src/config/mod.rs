//! Configuration management for LedgerGuard services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (in-process cache when absent)
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Session token configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Payment ledger configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Idempotency guard configuration
    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    /// Contact form configuration
    #[serde(default)]
    pub contact: ContactConfig,

    /// Read-through cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Create missing tables from the entity definitions on startup
    #[serde(default)]
    pub sync_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,

    /// Default TTL in seconds
    #[serde(default = "default_redis_ttl")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for session token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Upper bound of the random pause between conflicting attempts (0 disables)
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdempotencyConfig {
    /// Validity window of a recorded key
    #[serde(default = "default_idempotency_ttl")]
    pub ttl_secs: u64,

    /// Let requests through unguarded when the key store is unreachable
    #[serde(default)]
    pub fail_open: bool,

    /// How often the worker purges expired keys
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContactConfig {
    /// Submissions allowed per client IP within the window
    #[serde(default = "default_contact_limit")]
    pub max_per_window: u64,

    /// Trailing window length in seconds
    #[serde(default = "default_contact_window")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL of the admin dashboard aggregate
    #[serde(default = "default_dashboard_ttl")]
    pub dashboard_ttl_secs: u64,

    /// Prefix prepended to every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Prometheus scrape port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/ledgerguard".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_redis_ttl() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 60 * 60 * 24 * 30 }
fn default_retry_jitter() -> u64 { 25 }
fn default_idempotency_ttl() -> u64 { 60 * 60 * 24 }
fn default_purge_interval() -> u64 { 60 * 15 }
fn default_contact_limit() -> u64 { 5 }
fn default_contact_window() -> u64 { 60 * 60 }
fn default_dashboard_ttl() -> u64 { 300 }
fn default_key_prefix() -> String { "ledgerguard".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "ledgerguard".to_string() }
fn default_metrics_port() -> u16 { 9090 }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__IDEMPOTENCY__TTL_SECS=3600
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the read database URL (falls back to primary)
    /// Prometheus listener, `None` when disabled
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        match self.observability.metrics_port {
            0 => None,
            port => Some(SocketAddr::from(([0, 0, 0, 0], port))),
        }
    }

    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency.ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.idempotency.purge_interval_secs.max(1))
    }

    pub fn contact_window(&self) -> Duration {
        Duration::from_secs(self.contact.window_secs)
    }

    pub fn dashboard_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.dashboard_ttl_secs)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.ledger.retry_jitter_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sync_schema: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retry_jitter_ms: default_retry_jitter(),
        }
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl(),
            fail_open: false,
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_contact_limit(),
            window_secs: default_contact_window(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dashboard_ttl_secs: default_dashboard_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: None,
            auth: AuthConfig::default(),
            ledger: LedgerConfig::default(),
            idempotency: IdempotencyConfig::default(),
            contact: ContactConfig::default(),
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
