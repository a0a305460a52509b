//! Difficulty engine configuration
//!
//! Read from the `[difficulty]` table of the IVP config file:
//!
//! ```toml
//! [difficulty]
//! default_difficulty = "medium"
//! cache_enabled = true
//! ```

use crate::{Error, Result};
use ivp_common::DifficultyLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Last-resort difficulty when a session has no usable difficulty data
    pub default_difficulty: DifficultyLevel,

    /// Keep states in the in-memory write-through cache
    pub cache_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_difficulty: DifficultyLevel::Medium,
            cache_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Extract the `[difficulty]` table from a parsed config file
    ///
    /// A missing table yields defaults; a malformed one is an error.
    pub fn from_toml_value(config: &toml::Value) -> Result<Self> {
        match config.get("difficulty") {
            Some(table) => table
                .clone()
                .try_into::<EngineConfig>()
                .map_err(|e| Error::Config(format!("Invalid [difficulty] section: {}", e))),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit file or the platform config file
    ///
    /// No config file at all is not an error: defaults are used with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match ivp_common::config::load_config_toml(explicit)? {
            Some(value) => {
                let config = Self::from_toml_value(&value)?;
                info!(
                    "Difficulty engine config: default_difficulty={}, cache_enabled={}",
                    config.default_difficulty, config.cache_enabled
                );
                Ok(config)
            }
            None => {
                warn!("No config file found, using default difficulty engine settings");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_difficulty, DifficultyLevel::Medium);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_parse_difficulty_table() {
        let value: toml::Value = toml::from_str(
            r#"
            root_folder = "/srv/ivp"

            [difficulty]
            default_difficulty = "Hard"
            cache_enabled = false
            "#,
        )
        .unwrap();

        let config = EngineConfig::from_toml_value(&value).unwrap();
        assert_eq!(config.default_difficulty, DifficultyLevel::Hard);
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_missing_table_uses_defaults() {
        let value: toml::Value = toml::from_str("root_folder = \"/srv/ivp\"").unwrap();
        assert_eq!(EngineConfig::from_toml_value(&value).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let value: toml::Value = toml::from_str("[difficulty]\ncache_enabled = false").unwrap();
        let config = EngineConfig::from_toml_value(&value).unwrap();
        assert_eq!(config.default_difficulty, DifficultyLevel::Medium);
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let value: toml::Value =
            toml::from_str("[difficulty]\ndefault_difficulty = \"nightmare\"").unwrap();
        assert!(matches!(
            EngineConfig::from_toml_value(&value),
            Err(Error::Config(_))
        ));
    }
}
