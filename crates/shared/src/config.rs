use std::path::PathBuf;

use thiserror::Error;

use crate::config_env::{
    http_url_env, optional_trimmed_env, parse_u32_env, parse_u64_env, parse_usize_env,
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_GOOGLE_MAPS_BASE_URL: &str = "https://maps.googleapis.com/maps/api";
const DEFAULT_TICKETMASTER_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2";
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SEARCH_RESULT_LIMIT: usize = 10;
const DEFAULT_AMADEUS_BASE_URL: &str = "https://test.api.amadeus.com";
const DEFAULT_PLANNER_IDLE_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// `None` runs the server against the in-memory chat store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub migrations_dir: PathBuf,
    /// Live planning sessions idle this long are dropped from memory.
    pub planner_idle_ttl_secs: u64,
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub google_api_key: Option<String>,
    pub ticketmaster_api_key: Option<String>,
    pub google_maps_base_url: String,
    pub ticketmaster_base_url: String,
    pub amadeus_api_key: Option<String>,
    pub amadeus_api_secret: Option<String>,
    pub amadeus_base_url: String,
    pub timeout_ms: u64,
    pub result_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional_trimmed_env("API_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: optional_trimmed_env("DATABASE_URL"),
            database_max_connections: parse_u32_env("DATABASE_MAX_CONNECTIONS", 10)?,
            migrations_dir: optional_trimmed_env("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../db/migrations")
                }),
            planner_idle_ttl_secs: parse_u64_env(
                "PLANNER_IDLE_TTL_SECS",
                DEFAULT_PLANNER_IDLE_TTL_SECS,
            )?,
            search: SearchConfig::from_env()?,
        })
    }
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let result_limit = parse_usize_env("SEARCH_RESULT_LIMIT", DEFAULT_SEARCH_RESULT_LIMIT)?;
        if result_limit == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SEARCH_RESULT_LIMIT must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            google_api_key: optional_trimmed_env("GOOGLE_API_KEY"),
            ticketmaster_api_key: optional_trimmed_env("TICKETMASTER_API_KEY"),
            google_maps_base_url: http_url_env(
                "GOOGLE_MAPS_BASE_URL",
                DEFAULT_GOOGLE_MAPS_BASE_URL,
            )?,
            ticketmaster_base_url: http_url_env(
                "TICKETMASTER_BASE_URL",
                DEFAULT_TICKETMASTER_BASE_URL,
            )?,
            amadeus_api_key: optional_trimmed_env("AMADEUS_API_KEY"),
            amadeus_api_secret: optional_trimmed_env("AMADEUS_API_SECRET"),
            amadeus_base_url: http_url_env("AMADEUS_BASE_URL", DEFAULT_AMADEUS_BASE_URL)?,
            timeout_ms: parse_u64_env("SEARCH_TIMEOUT_MS", DEFAULT_SEARCH_TIMEOUT_MS)?,
            result_limit,
        })
    }
}
