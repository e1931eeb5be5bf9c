//! API server configuration.
//!
//! ## Load Order
//! ```text
//! built-in defaults
//!      │
//!      ▼
//! pharma.toml (optional, working directory)
//!      │
//!      ▼
//! PHARMA_* environment variables   e.g. PHARMA_PORT=9000
//!      │                                PHARMA_JWT_SECRET=...
//!      ▼
//! ApiConfig::validate()
//! ```

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONFIG_FILE: &str = "pharma";
const ENV_PREFIX: &str = "PHARMA";

/// Signing secret used when none is configured. Only fit for local work.
pub const DEV_JWT_SECRET: &str = "pharma-dev-secret-change-in-production";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Interface to bind
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// SQLite database file
    pub database_path: String,

    /// Upper bound on pooled SQLite connections
    pub max_connections: u32,

    /// HS256 secret shared with the identity service
    pub jwt_secret: String,

    /// Access token lifetime in seconds (tokens minted by this process)
    pub jwt_access_lifetime_secs: i64,

    /// Pending orders older than this are cancelled and their stock released
    pub reservation_ttl_minutes: i64,

    /// How often the reservation sweeper runs
    pub sweep_interval_secs: u64,

    /// Attempts for checkout when SQLite reports busy
    pub busy_retries: u32,

    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,

    pub log_format: LogFormat,
}

impl ApiConfig {
    /// Load configuration from defaults, `pharma.toml` and `PHARMA_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        Self::from_builder(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("database_path", "./pharma.db")?
            .set_default("max_connections", 5)?
            .set_default("jwt_secret", DEV_JWT_SECRET)?
            .set_default("jwt_access_lifetime_secs", 3600)?
            .set_default("reservation_ttl_minutes", 30)?
            .set_default("sweep_interval_secs", 60)?
            .set_default("busy_retries", 3)?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: ApiConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt_secret".to_string()));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::MissingRequired("database_path".to_string()));
        }
        if self.reservation_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue("reservation_ttl_minutes".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("sweep_interval_secs".to_string()));
        }
        if self.jwt_access_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("jwt_access_lifetime_secs".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reservation_ttl_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_path: "./pharma.db".to_string(),
            max_connections: 5,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_access_lifetime_secs: 3600,
            reservation_ttl_minutes: 30,
            sweep_interval_secs: 60,
            busy_retries: 3,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
