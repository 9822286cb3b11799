//! Configuration loading for stashscan
//!
//! Resolution priority for every field: environment variable, then the TOML
//! config file, then the compiled default. The config file path itself comes
//! from `STASHSCAN_CONFIG` and defaults to `./stashscan.toml`; a missing file
//! is not an error, it just means TOML contributes nothing.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database location; `path` falls back to the OS data directory
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Market price API endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    /// Base URL of the price API (catalog + order books)
    #[serde(default = "default_market_api_url")]
    pub api_url: String,
    /// Base URL used to build item deep links
    #[serde(default = "default_market_web_url")]
    pub web_url: String,
}

/// Vision model endpoint (OpenAI-style chat completions)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisionConfig {
    #[serde(default = "default_vision_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vision_model")]
    pub model: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7751
}

fn default_market_api_url() -> String {
    "https://market.example/api/v1".to_string()
}

fn default_market_web_url() -> String {
    "https://market.example".to_string()
}

fn default_vision_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            api_url: default_market_api_url(),
            web_url: default_market_web_url(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_url: default_vision_api_url(),
            api_key: None,
            model: default_vision_model(),
        }
    }
}

impl Config {
    /// Load configuration from the TOML file (if present) and apply
    /// environment overrides on top.
    pub fn load() -> Result<Config> {
        let path = std::env::var("STASHSCAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("stashscan.toml"));

        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML config file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Environment variables take priority over TOML values.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STASHSCAN_HOST") {
            self.http.host = host;
        }
        if let Ok(port) = std::env::var("STASHSCAN_PORT") {
            match port.parse() {
                Ok(port) => self.http.port = port,
                Err(_) => warn!("Ignoring invalid STASHSCAN_PORT value: {}", port),
            }
        }
        if let Ok(path) = std::env::var("STASHSCAN_DB") {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("STASHSCAN_MARKET_API_URL") {
            self.market.api_url = url;
        }
        if let Ok(url) = std::env::var("STASHSCAN_MARKET_WEB_URL") {
            self.market.web_url = url;
        }
        if let Ok(url) = std::env::var("STASHSCAN_VISION_API_URL") {
            self.vision.api_url = url;
        }
        if let Ok(key) = std::env::var("STASHSCAN_VISION_API_KEY") {
            self.vision.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("STASHSCAN_VISION_MODEL") {
            self.vision.model = model;
        }
    }

    /// Resolve the database file path, defaulting to the OS data directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("stashscan"))
            .unwrap_or_else(|| PathBuf::from("./stashscan_data"))
            .join("stashscan.db")
    }
}
