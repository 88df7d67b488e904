//! Bridge configuration
//!
//! Loaded from TOML, then overlaid with `HOSTBRIDGE_*` environment variables.

use crate::dispatcher::{CommandWhitelist, WhitelistEntry};
use crate::search::SearchConfig;
use hostbridge_logging::LoggingConfig;
use hostbridge_transport::HttpConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_HOST: &str = "HOSTBRIDGE_HOST";
pub const ENV_PORT: &str = "HOSTBRIDGE_PORT";
pub const ENV_LOG: &str = "HOSTBRIDGE_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {name}: {message}")]
    Env { name: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub http: HttpConfig,
    pub search: SearchConfig,
    /// Replaces the built-in allow-list when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<WhitelistEntry>>,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Overlay `HOSTBRIDGE_HOST`, `HOSTBRIDGE_PORT` and `HOSTBRIDGE_LOG`
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay variables resolved through `lookup`
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.http.host = host;
        }

        if let Some(port) = lookup(ENV_PORT) {
            self.http.port = port.trim().parse().map_err(|e| ConfigError::Env {
                name: ENV_PORT.to_string(),
                message: format!("{e}"),
            })?;
        }

        if let Some(level) = lookup(ENV_LOG) {
            self.logging.level = level;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.host.trim().is_empty() {
            return Err(ConfigError::Invalid("http.host must not be empty".to_string()));
        }

        if self.http.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "http.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if self.http.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.keep_alive_secs must be greater than 0".to_string(),
            ));
        }

        if self.search.operation.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "search.operation must not be empty".to_string(),
            ));
        }

        if let Some(entries) = &self.whitelist {
            if let Some(entry) = entries.iter().find(|e| e.name.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "whitelist entry with empty name (requires_program = {})",
                    entry.requires_program
                )));
            }
        }

        Ok(())
    }

    /// The effective allow-list
    pub fn command_whitelist(&self) -> CommandWhitelist {
        match &self.whitelist {
            Some(entries) => CommandWhitelist::new(entries.iter().cloned()),
            None => CommandWhitelist::default(),
        }
    }
}
