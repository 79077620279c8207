//! Configuration of the atomic operations endpoint.

use serde::{Deserialize, Serialize};

/// Configuration error for atomic operations settings
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("'max_operations' must be greater than zero")]
    ZeroMaxOperations,
    #[error("'url_path' must start with '/', got '{path}'")]
    InvalidUrlPath { path: String },
    #[error("invalid atomic config: {source}")]
    Invalid {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AtomicConfig {
    /// Upper bound on `atomic:operations` entries accepted in one request.
    pub max_operations: usize,
    /// Route of the atomic endpoint.
    pub url_path: String,
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self {
            max_operations: 100,
            url_path: "/operations".to_owned(),
        }
    }
}

impl AtomicConfig {
    /// Parse a raw JSON section, falling back to defaults for missing fields.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the section cannot be deserialized and
    /// any other variant if the values are out of range.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_value(raw).map_err(|source| ConfigError::Invalid { source })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if `max_operations` is zero or `url_path` is not absolute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_operations == 0 {
            return Err(ConfigError::ZeroMaxOperations);
        }
        if !self.url_path.starts_with('/') {
            return Err(ConfigError::InvalidUrlPath {
                path: self.url_path.clone(),
            });
        }
        Ok(())
    }
}
