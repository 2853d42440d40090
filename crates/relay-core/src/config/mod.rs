//! # Relay Core Configuration
//!
//! [`RelayConfig`] holds the settings an [`Application`](crate::kernel::Application)
//! is built from: the log filter, whether the task queue drains at shutdown,
//! subscriptions declared as JSON specs and default payload values merged
//! into every published event.
//!
//! Files are read as JSON, YAML (`yaml-config` feature) or TOML
//! (`toml-config` feature), chosen by extension.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::error::EventSystemError;
use crate::event::interface::SubscriptionSpec;
use crate::kernel::constants;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported config format for '{path}'")]
    UnsupportedFormat { path: String },

    #[error("Failed to serialize to {format}: {message}")]
    Serialize { format: &'static str, message: String },

    #[error("Failed to deserialize from {format}: {message}")]
    Deserialize { format: &'static str, message: String },

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// `tracing` filter directive, e.g. `info` or `relay_core=debug`
    pub log_level: String,
    /// Drain the task queue when the application shuts down
    pub drain_on_shutdown: bool,
    /// Event name to subscription spec
    pub subscriptions: BTreeMap<String, Value>,
    /// Values merged beneath every payload published through the application
    pub defaults: BTreeMap<String, Value>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: constants::DEFAULT_LOG_LEVEL.to_string(),
            drain_on_shutdown: true,
            subscriptions: BTreeMap::new(),
            defaults: BTreeMap::new(),
        }
    }
}

impl RelayConfig {
    /// Read and parse a config file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.display().to_string(),
        })?;
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::deserialize(&data, format)?;
        log::debug!(
            "Loaded config from {} ({} subscription(s))",
            path.display(),
            config.subscriptions.len()
        );
        Ok(config)
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                format: "JSON",
                message: e.to_string(),
            }),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize {
                format: "YAML",
                message: e.to_string(),
            }),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                format: "TOML",
                message: e.to_string(),
            }),
        }
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| ConfigError::Deserialize {
                format: "JSON",
                message: e.to_string(),
            }),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| ConfigError::Deserialize {
                format: "YAML",
                message: e.to_string(),
            }),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| ConfigError::Deserialize {
                format: "TOML",
                message: e.to_string(),
            }),
        }
    }

    /// Parse the configured subscriptions, in event name order
    pub fn subscription_specs(&self) -> Result<Vec<(String, SubscriptionSpec)>, EventSystemError> {
        self.subscriptions
            .iter()
            .map(|(event_name, spec)| Ok((event_name.clone(), SubscriptionSpec::from_value(spec)?)))
            .collect()
    }

    /// Effective log filter; `RELAY_LOG` wins over `log_level` when set
    pub fn log_filter(&self) -> String {
        match std::env::var(constants::ENV_LOG) {
            Ok(filter) if !filter.trim().is_empty() => filter,
            _ => self.log_level.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
