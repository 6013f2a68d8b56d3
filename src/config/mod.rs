//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated
    pub client_origin: String,

    /// Match history database URL; the result store is disabled when unset
    pub match_db_url: Option<String>,
    /// Service key for the match history database
    pub match_db_service_key: Option<String>,

    /// Default score threshold that ends a match
    pub max_score: u32,
    /// Pre-game countdown length in seconds
    pub countdown_secs: u32,
}

const DEFAULT_MAX_SCORE: u32 = 10;
const DEFAULT_COUNTDOWN_SECS: u32 = 5;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            match_db_url: env::var("MATCH_DB_URL").ok(),
            match_db_service_key: env::var("MATCH_DB_SERVICE_KEY").ok(),

            max_score: parse_or_default("MAX_SCORE", DEFAULT_MAX_SCORE)?,
            countdown_secs: parse_or_default("COUNTDOWN_SECS", DEFAULT_COUNTDOWN_SECS)?,
        })
    }
}

fn parse_or_default(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
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
