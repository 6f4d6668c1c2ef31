//! Configuration management
//!
//! This module handles loading, validation, and management of the Folio configuration.
//! Configuration is stored in TOML format at ~/.folio/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **session**: Context window size, default session title, system prompt
//! - **stream**: Text-stream provider, model and sampling settings
//! - **bus**: Event bus subscriber buffering
//!
//! Every section is optional; missing values fall back to defaults.
//!
//! # Examples
//!
//! ```no_run
//! use folio_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Model: {}", config.stream.model);
//! println!("Context window: {} turns", config.session.context_window);
//! # Ok(())
//! # }
//! ```

use sdk::errors::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Session and prompt-context settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Streaming completion settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Event bus settings
    #[serde(default)]
    pub bus: BusConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of recent dialogue turns (user + assistant) sent to the model
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Title used when CreateSession carries none
    #[serde(default = "default_title")]
    pub default_title: String,

    /// System prompt placed at the head of every assistant context
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Which text-stream collaborator backs the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamProvider {
    /// Local Ollama server
    Ollama,
    /// In-process echo source (offline use and tests)
    Scripted,
}

/// Streaming completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_provider")]
    pub provider: StreamProvider,

    /// Base URL of the model server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Coalesce deltas arriving within this window before emitting them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching_interval_ms: Option<u64>,

    /// Whole-request timeout for the model server
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Capacity of each subscriber channel
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.folio")
}

fn default_context_window() -> usize {
    6
}

fn default_title() -> String {
    "New session".to_string()
}

fn default_system_prompt() -> String {
    "You are a literature research assistant. Answer precisely and cite the works you rely on."
        .to_string()
}

fn default_provider() -> StreamProvider {
    StreamProvider::Ollama
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_subscriber_buffer() -> usize {
    100
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            default_title: default_title(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: None,
            batching_interval_ms: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.folio/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, RuntimeError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, RuntimeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, RuntimeError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, RuntimeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RuntimeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| RuntimeError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RuntimeError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.folio/config.toml)
    pub fn default_config_path() -> Result<PathBuf, RuntimeError> {
        let home = dirs::home_dir().ok_or_else(|| {
            RuntimeError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".folio").join("config.toml"))
    }

    /// Validate ranges and expand paths
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Config` describing the first invalid value.
    fn validate_and_process(&mut self) -> Result<(), RuntimeError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(RuntimeError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.session.context_window == 0 {
            return Err(RuntimeError::Config(
                "context_window must be at least 1".to_string(),
            ));
        }

        if let Some(temperature) = self.stream.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RuntimeError::Config(
                    "temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.stream.request_timeout_secs == 0 {
            return Err(RuntimeError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.bus.subscriber_buffer == 0 {
            return Err(RuntimeError::Config(
                "subscriber_buffer must be greater than 0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, RuntimeError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RuntimeError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            RuntimeError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| RuntimeError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
