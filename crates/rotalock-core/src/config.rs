//! Configuration types for the rotation lock settings system
//!
//! This module defines the configuration structures used by the daemon and
//! by embedders that construct the manager from declarative config.

use serde::{Deserialize, Serialize};

use crate::policy::UserId;

/// Main rotation lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotalockConfig {
    /// Per-device-state defaults as `"key:value"` entry strings
    ///
    /// An empty list disables the feature for this deployment. Individual
    /// malformed entries are tolerated at load time (logged and skipped),
    /// so they are not rejected here.
    #[serde(default)]
    pub defaults: Vec<String>,

    /// Settings store backend
    #[serde(default)]
    pub store: StoreBackendConfig,

    /// User scope for reads and writes
    #[serde(default)]
    pub user: UserId,
}

impl RotalockConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            defaults: Vec::new(),
            store: StoreBackendConfig::default(),
            user: 0,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()
    }
}

impl Default for RotalockConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings store backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// File-based settings store
    File {
        /// Path to the settings state file
        path: String,
    },

    /// In-memory settings store (not persistent)
    #[default]
    Memory,
}

impl StoreBackendConfig {
    /// Validate the store backend configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreBackendConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File store path cannot be empty"));
                }
                Ok(())
            }
            StoreBackendConfig::Memory => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RotalockConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.defaults.is_empty());
    }

    #[test]
    fn test_empty_file_path_is_rejected() {
        let config = RotalockConfig {
            store: StoreBackendConfig::File {
                path: String::new(),
            },
            ..RotalockConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_backend_deserializes_from_tagged_json() {
        let config: StoreBackendConfig =
            serde_json::from_str(r#"{"type": "file", "path": "/tmp/settings.json"}"#).unwrap();
        assert!(matches!(config, StoreBackendConfig::File { .. }));

        let config: StoreBackendConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert!(matches!(config, StoreBackendConfig::Memory));
    }
}
