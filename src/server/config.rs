//! Server configuration.
//!
//! Loaded from `atelier.toml` with serde defaults for every field; a
//! missing file means pure defaults. Secrets (the Redis URL, peer base
//! URLs) can be supplied through the environment via dotenv before
//! startup.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// SQLite database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Redis broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_redis_url(),
        }
    }
}

impl RedisConfig {
    /// Effective URL for the bus; `None` disables the broker path
    pub fn effective_url(&self) -> Option<String> {
        if !self.enabled || self.url.is_empty() {
            return None;
        }
        Some(
            std::env::var("ATELIER_REDIS_URL").unwrap_or_else(|_| self.url.clone()),
        )
    }
}

/// Fallback base URLs for the counterpart modules.
///
/// An empty URL disables the HTTP fallback toward that module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default)]
    pub finance_url: Option<String>,
    #[serde(default)]
    pub operations_url: Option<String>,
    #[serde(default)]
    pub marketing_url: Option<String>,
    #[serde(default)]
    pub executive_url: Option<String>,
}

/// Timeout sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8004
}
fn default_db_path() -> String {
    "data/atelier.db".to_string()
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}

/// Load configuration; a missing file yields defaults
pub fn load_config(path: &str) -> Result<AppConfig> {
    if !Path::new(path).exists() {
        return Ok(AppConfig::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {path}"))
}

/// Write the default configuration to `path`
pub fn write_default_config(path: &str) -> Result<()> {
    let content = toml::to_string_pretty(&AppConfig::default())
        .context("failed to serialize default config")?;
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
    }
    fs::write(path, content).with_context(|| format!("failed to write {path}"))?;
    Ok(())
}
