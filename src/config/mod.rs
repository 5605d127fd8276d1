// src/config/mod.rs
//! Process configuration read from the environment (`.env` is loaded by the
//! binaries before this runs).

pub mod oracle;

pub use oracle::OracleConfig;

use std::env;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://moodlight.db?mode=rwc";
pub const DEFAULT_ORACLE_CONFIG_PATH: &str = "config/oracle.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub update_interval: Duration,
    pub initial_delay: Duration,
    pub headlines_per_source: usize,
    pub cache_ttl: Duration,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub oracle_config_path: String,
    pub fetch_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(1800),
            initial_delay: Duration::from_secs(10),
            headlines_per_source: 1,
            cache_ttl: Duration::from_secs(300),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            redis_url: None,
            oracle_config_path: DEFAULT_ORACLE_CONFIG_PATH.to_string(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Read every key, keeping the default for unset or unparsable values.
    pub fn from_env() -> Self {
        let d = Self::default();
        let headlines = env_parse::<usize>("HEADLINES_PER_SOURCE")
            .or_else(|| env_parse::<usize>("DEFAULT_HEADLINES_PER_SOURCE"))
            .filter(|n| *n >= 1)
            .unwrap_or(d.headlines_per_source);

        Self {
            update_interval: env_secs("UPDATE_INTERVAL_SECS").unwrap_or(d.update_interval),
            initial_delay: env_parse::<u64>("UPDATE_INITIAL_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.initial_delay),
            headlines_per_source: headlines,
            cache_ttl: env_secs("CACHE_TTL_SECS").unwrap_or(d.cache_ttl),
            database_url: env_string("DATABASE_URL").unwrap_or(d.database_url),
            redis_url: env_string("REDIS_URL"),
            oracle_config_path: env_string("ORACLE_CONFIG_PATH").unwrap_or(d.oracle_config_path),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS").unwrap_or(d.fetch_timeout),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

// Zero is not a usable period.
fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key)
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}
