//! Reader pipeline configuration.
//!
//! Stored as JSON so tools can share one tuning file. Missing fields take
//! their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tuning knobs for [`ConcurrentNetworkReader`](crate::ConcurrentNetworkReader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Worker threads building points from records (0 = one per CPU)
    pub map_threads: usize,
    /// Records built per window; bounds points waiting for the reducer
    pub queue_depth: usize,
    /// Emit a progress event every this many reduced points
    pub progress_interval: usize,
    /// Interval at which a read waiting for the permit re-checks cancellation
    pub permit_poll_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            map_threads: 0,
            queue_depth: 256,
            progress_interval: 100,
            permit_poll_ms: 50,
        }
    }
}

impl ReaderConfig {
    /// Number of point-builder threads after resolving the 0 default.
    pub fn effective_map_threads(&self) -> usize {
        if self.map_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.map_threads
        }
    }

    /// Builder-style setter for the thread count.
    pub fn with_map_threads(mut self, map_threads: usize) -> Self {
        self.map_threads = map_threads;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "queue_depth must be greater than 0".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "progress_interval must be greater than 0".to_string(),
            ));
        }
        if self.permit_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "permit_poll_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
