//! Client configuration
//!
//! Loaded from a TOML file in the platform data directory; every field has
//! a serde default so partial files and missing files both work.

use crate::error::{AutomlError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_ID: &str = "automl-client";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_POLL_RETRY_BUDGET: u32 = 5;
pub const DEFAULT_COMMAND_BUFFER: usize = 32;
pub const DEFAULT_MESSAGE_BUFFER: usize = 256;

const CONFIG_FILE: &str = "config.toml";

/// Where the service lives and how long we wait for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Status polling cadence and channel sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between status checks
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive failed status checks tolerated before giving up
    #[serde(default = "default_poll_retry_budget")]
    pub transport_retry_budget: u32,
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            transport_retry_budget: default_poll_retry_budget(),
            command_buffer: default_command_buffer(),
            message_buffer: default_message_buffer(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_poll_retry_budget() -> u32 {
    DEFAULT_POLL_RETRY_BUDGET
}
fn default_command_buffer() -> usize {
    DEFAULT_COMMAND_BUFFER
}
fn default_message_buffer() -> usize {
    DEFAULT_MESSAGE_BUFFER
}

/// Platform data directory for this application
pub fn data_dir() -> Result<PathBuf> {
    dirs_next::data_dir()
        .map(|dir| dir.join(APP_ID))
        .ok_or_else(|| AutomlError::Config("could not determine platform data directory".to_string()))
}

impl ClientConfig {
    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| AutomlError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AutomlError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from the platform data directory
    pub fn load() -> Result<Self> {
        Self::load_from(&data_dir()?.join(CONFIG_FILE))
    }

    /// Save to the platform data directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&data_dir()?.join(CONFIG_FILE))
    }

    /// Load from the platform data directory, falling back to defaults
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }
}
