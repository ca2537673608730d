//! Application configuration
//!
//! Settings are layered: built-in defaults, then environment variables with
//! the `MAESTRO_` prefix (e.g. `MAESTRO_DATABASE_URL`, `MAESTRO_BIND_ADDR`).

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),
}

/// Runtime configuration for the Maestro server
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP bind address
    pub bind_addr: String,

    /// PostgreSQL connection string; in-memory stores are used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Wall-clock budget for a single execution, in seconds
    pub execution_timeout_secs: u64,

    /// Scan interval of the stale-execution sweeper, in seconds
    pub sweeper_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from defaults and `MAESTRO_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:3000")?
            .set_default("execution_timeout_secs", 600_i64)?
            .set_default("sweeper_interval_secs", 60_i64)?
            .add_source(config::Environment::with_prefix("MAESTRO"))
            .build()?;

        Ok(cfg.try_deserialize()?)
    }

    /// Parse the configured bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }

    /// Per-execution wall-clock timeout.
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Sweeper scan interval.
    #[must_use]
    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::load().expect("defaults load");
        assert_eq!(config.execution_timeout(), Duration::from_secs(600));
        assert_eq!(config.sweeper_interval(), Duration::from_secs(60));
        assert!(config.socket_addr().is_ok());
    }

    #[test]
    fn test_invalid_bind_addr() {
        let config = AppConfig {
            bind_addr: "not-an-addr".to_string(),
            database_url: None,
            execution_timeout_secs: 600,
            sweeper_interval_secs: 60,
        };
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::InvalidBindAddr(_))
        ));
    }
}
