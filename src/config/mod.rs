//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;
use crate::util::time::SIMULATION_TPS;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated; `None` allows any origin
    pub client_origin: Option<String>,

    /// Simulation ticks per second for every room
    pub tick_rate: u32,
    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Upper bound on the input latency nudge, in milliseconds (0 disables it)
    pub lag_compensation_max_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let tick_rate = parse_var("TICK_RATE", SIMULATION_TPS)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .ok()
                .filter(|origin| !origin.trim().is_empty() && origin.trim() != "*"),

            tick_rate,
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
            lag_compensation_max_ms: parse_var("LAG_COMPENSATION_MAX_MS", 100)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: None,
            tick_rate: SIMULATION_TPS,
            input_rate_limit: INPUT_RATE_LIMIT,
            lag_compensation_max_ms: 100,
        }
    }
}

/// Read an optional numeric variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
