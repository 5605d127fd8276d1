// src/config/oracle.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    45
}
fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Only "openai" is wired; anything else yields the disabled oracle.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

impl OracleConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let mut cfg: OracleConfig = serde_json::from_str(data)?;

        cfg.provider = cfg.provider.to_lowercase();

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?,
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }
        if !(0.0..=2.0).contains(&cfg.temperature) {
            cfg.temperature = default_temperature();
        }

        Ok(cfg)
    }

    /// Load from `path`, or fall back to env-only settings when the file is
    /// missing: enabled iff `OPENAI_API_KEY` is set.
    pub fn load_or_env<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            return Self::load_from_file(path);
        }
        let key = env::var("OPENAI_API_KEY").unwrap_or_default();
        Ok(Self {
            enabled: !key.trim().is_empty(),
            api_key: key,
            ..Self::default()
        })
    }
}
