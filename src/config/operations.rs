//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{InterlockError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the interlock.yaml file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(InterlockError::Config)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            InterlockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| InterlockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            InterlockError::Config(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `shutdown_timeout_ms` must be positive
    /// - `default_transaction_timeout_ms` must be positive
    /// - `transaction.timeout_ms`, when set, must be positive
    /// - `non_blocking_thread_prefixes` entries must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.shutdown_timeout_ms == 0 {
            return Err(InterlockError::Config(
                "config validation failed: shutdown_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.default_transaction_timeout_ms == 0 {
            return Err(InterlockError::Config(
                "config validation failed: default_transaction_timeout_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.transaction.timeout_ms == Some(0) {
            return Err(InterlockError::Config(
                "config validation failed: transaction.timeout_ms must be greater than 0"
                    .to_string(),
            ));
        }

        for prefix in &self.non_blocking_thread_prefixes {
            if prefix.trim().is_empty() {
                return Err(InterlockError::Config(
                    "config validation failed: non_blocking_thread_prefixes entries must be non-empty"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Disposal deadline for lock groups.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Timeout for begun transactions: the configured one, else the default.
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(
            self.transaction
                .timeout_ms
                .unwrap_or(self.default_transaction_timeout_ms),
        )
    }
}
