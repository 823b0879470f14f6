use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::data::kraken::DEFAULT_BASE_URL;
use crate::data::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_port() -> u16 { 8080 }
fn default_request_timeout_ms() -> u64 { 4000 }
fn default_ttl_secs() -> u64 { 10 }
fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_retries() -> u32 { 2 }
fn default_backoff_base_ms() -> u64 { 200 }
fn default_timeout_secs() -> u64 { 5 }
fn default_log_level() -> String { "info".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: default_ttl_secs() }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CacheConfig {
    /// Zero means "use the default TTL".
    pub fn ttl(&self) -> Duration {
        match self.ttl_secs {
            0 => Duration::from_secs(default_ttl_secs()),
            secs => Duration::from_secs(secs),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.backoff_base_ms))
    }
}

/// Overrides read from the environment (and `.env`).
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub config_path: Option<String>,
    pub port: Option<u16>,
    pub cache_ttl_secs: Option<u64>,
    pub kraken_base_url: Option<String>,
    pub kraken_retries: Option<u32>,
}

impl Config {
    /// Parse a TOML config file. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(port) = env.port {
            self.server.port = port;
        }
        if let Some(ttl) = env.cache_ttl_secs {
            self.cache.ttl_secs = ttl;
        }
        if let Some(url) = &env.kraken_base_url {
            self.upstream.base_url = url.clone();
        }
        if let Some(retries) = env.kraken_retries {
            self.upstream.retries = retries;
        }
    }
}

impl EnvConfig {
    pub const CONFIG_PATH_VAR: &'static str = "LTP_CONFIG";
    pub const DEFAULT_CONFIG_PATH: &'static str = "config.toml";

    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            config_path: non_empty_var(Self::CONFIG_PATH_VAR),
            port: parsed_var("PORT"),
            cache_ttl_secs: parsed_var("CACHE_TTL"),
            kraken_base_url: non_empty_var("KRAKEN_BASE_URL"),
            kraken_retries: parsed_var("KRAKEN_RETRIES"),
        }
    }

    pub fn config_path(&self) -> &str {
        self.config_path
            .as_deref()
            .unwrap_or(Self::DEFAULT_CONFIG_PATH)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Unparsable values are ignored so the file/default value stays in effect.
fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|v| v.trim().parse().ok())
}
