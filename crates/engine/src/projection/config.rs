//! Projection store configuration via `foldline.toml`
//!
//! A store can be configured in code (`StoreConfig::new`) or from a TOML
//! file. Missing fields fall back to their defaults, so an empty file is a
//! valid configuration.

use foldline_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Config file name conventionally used for a projection store.
pub const CONFIG_FILE_NAME: &str = "foldline.toml";

/// Default name of the collection holding checkpoint records.
pub const DEFAULT_CHECKPOINT_COLLECTION: &str = "__checkpoints";

/// Default bound on replay passes restarted at one event.
pub const DEFAULT_MAX_REPLAY_PASSES: usize = 1024;

/// Projection store configuration loaded from `foldline.toml`.
///
/// # Example
///
/// ```toml
/// name = "journeys"
/// checkpoint_collection = "__checkpoints"
/// max_replay_passes = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store name, used in logs and the model registry.
    #[serde(default = "default_name")]
    pub name: String,
    /// Collection holding one checkpoint record per model collection.
    #[serde(default = "default_checkpoint_collection")]
    pub checkpoint_collection: String,
    /// Passes allowed to restart at the same event before the batch fails.
    ///
    /// Each read a transform makes during one event costs one pass the first
    /// time. Models suspend side by side, so an event whose busiest model
    /// reads N times needs N + 1 passes. Raise this for transforms that read
    /// more than `DEFAULT_MAX_REPLAY_PASSES - 1` times in one event.
    #[serde(default = "default_max_replay_passes")]
    pub max_replay_passes: usize,
}

fn default_name() -> String {
    "projections".to_string()
}

fn default_checkpoint_collection() -> String {
    DEFAULT_CHECKPOINT_COLLECTION.to_string()
}

fn default_max_replay_passes() -> usize {
    DEFAULT_MAX_REPLAY_PASSES
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            checkpoint_collection: default_checkpoint_collection(),
            max_replay_passes: default_max_replay_passes(),
        }
    }
}

impl StoreConfig {
    /// Default configuration with the given store name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Use a different checkpoint collection.
    pub fn with_checkpoint_collection(mut self, collection: impl Into<String>) -> Self {
        self.checkpoint_collection = collection.into();
        self
    }

    /// Change the replay pass bound.
    pub fn with_max_replay_passes(mut self, passes: usize) -> Self {
        self.max_replay_passes = passes;
        self
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an empty name or checkpoint collection, or a
    /// pass bound of 0.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("store name must not be empty".to_string()));
        }
        if self.checkpoint_collection.trim().is_empty() {
            return Err(Error::Config(
                "checkpoint_collection must not be empty".to_string(),
            ));
        }
        if self.max_replay_passes == 0 {
            return Err(Error::Config(
                "max_replay_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Foldline projection store configuration
#
# Store name, used in logs and the model registry
name = "projections"

# Collection holding one checkpoint record per model collection
checkpoint_collection = "__checkpoints"

# Passes allowed to restart at the same event before handle_events fails.
# Only a transform whose reads change between passes gets near this.
max_replay_passes = 1024
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, and `Config` if it cannot be
    /// parsed or holds invalid values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Io(io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to write default config file '{}': {}",
                        path.display(),
                        e
                    ),
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to write config file '{}': {}", path.display(), e),
            ))
        })
    }
}
