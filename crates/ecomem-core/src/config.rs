//! TOML-backed configuration
//!
//! Lets embedding hosts drive the pipeline from a config file instead of
//! hand-built structs. Every section falls back to its defaults, so a partial
//! file (or an empty one) is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimator::EstimatorConfig;
use crate::lag::LagConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration: one section per pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EcomemConfig {
    pub lag: LagConfig,
    pub estimator: EstimatorConfig,
}

impl EcomemConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, or fall back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.estimator.repetitions == 0 {
            return Err(ConfigError::Validation(
                "estimator.repetitions must be at least 1".to_string(),
            ));
        }
        if self.estimator.trees == 0 {
            return Err(ConfigError::Validation(
                "estimator.trees must be at least 1".to_string(),
            ));
        }
        if self.estimator.min_leaf == 0 {
            return Err(ConfigError::Validation(
                "estimator.min_leaf must be at least 1".to_string(),
            ));
        }
        if let Some(&lag) = self.lag.lags.iter().find(|&&l| !(l >= 0.0)) {
            return Err(ConfigError::Validation(format!(
                "lag.lags must be non-negative, found {lag}"
            )));
        }
        if let Some((min, max)) = self.lag.time_window {
            if min > max {
                return Err(ConfigError::Validation(format!(
                    "lag.time_window [{min}, {max}] is inverted"
                )));
            }
        }
        Ok(())
    }
}
