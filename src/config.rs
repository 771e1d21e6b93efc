// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

/// Single sessions accept a duration between 30 seconds and 10 minutes.
pub const SINGLE_MIN_DURATION_SECS: i64 = 30;
pub const SINGLE_MAX_DURATION_SECS: i64 = 600;

/// Class sessions accept a duration between 30 minutes and 3 hours.
pub const CLASS_MIN_DURATION_SECS: i64 = 1800;
pub const CLASS_MAX_DURATION_SECS: i64 = 10800;

pub const CODE_DIGITS: usize = 6;
pub const CLASS_CODE_PREFIX: &str = "CS_";

/// Upper bound on random draws before code allocation gives up.
pub const MAX_CODE_ATTEMPTS: usize = 32;

pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the engine on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    /// Interval of the background expiry sweep. 0 disables it.
    pub sweep_interval_secs: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("BIND_ADDR", raw))?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let sweep_interval_secs = match env::var("SESSION_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("SESSION_SWEEP_INTERVAL_SECS", raw))?,
            Err(_) => 30,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            sweep_interval_secs,
        })
    }
}
