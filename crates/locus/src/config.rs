//! Service configuration, read once from the environment at startup
//! and passed explicitly into each component.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

/// Configuration errors are fatal at startup (exit code 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub auth_token: String,
    pub retain_days: u32,
    pub partition_horizon_days: u32,
    pub worker_batch: i64,
    pub worker_concurrency: usize,
    pub gnss_max_accuracy_m: f64,
    pub laa_filter: bool,
    pub max_db_connections: u32,
}

impl Config {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn required(
            get: &impl Fn(&str) -> Option<String>,
            name: &'static str,
        ) -> Result<String, ConfigError> {
            get(name).ok_or(ConfigError::Missing(name))
        }

        fn parsed<T: FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            name: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(raw) => raw
                    .parse()
                    .map_err(|_| ConfigError::Invalid(name, raw)),
            }
        }

        Ok(Config {
            bind_addr: parsed(&get, "BIND_ADDR", "0.0.0.0:8080".parse().unwrap())?,
            database_url: required(&get, "DATABASE_URL")?,
            auth_token: required(&get, "AUTH_TOKEN")?,
            retain_days: parsed(&get, "RETAIN_DAYS", 120)?,
            partition_horizon_days: parsed(&get, "PARTITION_HORIZON_DAYS", 7)?,
            worker_batch: parsed(&get, "WORKER_BATCH", 256)?,
            worker_concurrency: parsed(&get, "WORKER_CONCURRENCY", 2)?,
            gnss_max_accuracy_m: parsed(&get, "GNSS_MAX_ACCURACY_M", 200.0)?,
            laa_filter: parsed(&get, "LAA_FILTER", true)?,
            max_db_connections: parsed(&get, "MAX_DB_CONNECTIONS", 10)?,
        })
    }
}
