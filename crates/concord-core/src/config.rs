//! Configuration module for Concord
//!
//! Engine settings can be given programmatically, or loaded from an optional
//! TOML file merged with `CONCORD_`-prefixed environment variables
//! (`CONCORD_CACHE_CAPACITY=512`, `CONCORD_LOGGING__FILTER=debug`).

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{ConcordError, Result};

/// Relation view engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of cached views before LRU eviction
    pub cache_capacity: usize,

    /// Patch cached reaction aggregates for single annotation/redaction
    /// events instead of recomputing them
    pub incremental_reactions: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,

    /// Emit span close events with timings
    pub span_timings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            incremental_reactions: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            span_timings: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment, in that order of precedence (last wins)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConcordError::Config(format!(
                    "Config file does not exist: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("CONCORD_").split("__"));

        let config: EngineConfig = figment
            .extract()
            .map_err(|e| ConcordError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ConcordError::Config("Cache capacity cannot be 0".into()));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConcordError::Config("Log filter cannot be empty".into()));
        }
        Ok(())
    }
}
