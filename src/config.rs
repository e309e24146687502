use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::proxy::ProxyConfig;

// Default configuration constants
const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_MAX_IDLE_PER_HOST: u64 = 10;
const DEFAULT_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;

pub const API_KEY_VAR: &str = "PERPLEXITY_API_KEY";
pub const BASE_URL_VAR: &str = "PERPLEXITY_BASE_URL";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub perplexity: PerplexityConfig,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct PerplexityConfig {
    pub api_key: String,
    pub base_url: String,
}

// Keep the key out of logs
impl fmt::Debug for PerplexityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerplexityConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub timeout_seconds: u64,
    pub max_idle_per_host: u64,
    pub pool_idle_timeout_seconds: u64,
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`], with the API key, base URL and proxy
    /// variables read through `lookup` instead of the process environment.
    pub fn load_with<F>(config_path: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = config::Config::builder();

        // Default values
        settings = settings
            .set_default("perplexity.api_key", "")?
            .set_default("perplexity.base_url", DEFAULT_BASE_URL)?
            .set_default("connection.timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?
            .set_default("connection.max_idle_per_host", DEFAULT_MAX_IDLE_PER_HOST)?
            .set_default(
                "connection.pool_idle_timeout_seconds",
                DEFAULT_POOL_IDLE_TIMEOUT_SECONDS,
            )?;

        // Load from config file if provided
        if let Some(path) = config_path
            && Path::new(path).exists()
        {
            settings = settings.add_source(config::File::with_name(path));
        }

        // Override with environment variables
        settings = settings.add_source(
            config::Environment::with_prefix("PERPLEXITY_MCP")
                .prefix_separator("_")
                .separator("__"),
        );

        if let Some(key) = lookup(API_KEY_VAR).filter(|k| !k.trim().is_empty()) {
            settings = settings.set_override("perplexity.api_key", key)?;
        }

        if let Some(url) = lookup(BASE_URL_VAR).filter(|u| !u.trim().is_empty()) {
            settings = settings.set_override("perplexity.base_url", url)?;
        }

        let mut config: Config = settings.build()?.try_deserialize()?;

        if config.perplexity.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "{} environment variable is required",
                API_KEY_VAR
            ));
        }

        config.proxy = ProxyConfig::from_lookup(&lookup);

        Ok(config)
    }
}
