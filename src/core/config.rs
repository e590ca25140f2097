//! Runtime configuration.
//!
//! Loaded from / saved to JSON. Every field has a default so partial files
//! are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Default edge length of a scheduling tile, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Largest accepted tile edge length, in pixels.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Configuration handed to the intersection engine constructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the registered engine builder ("native" is built in).
    pub name: String,
    /// Worker threads the engine may use for scene builds. 0 = engine default.
    pub threads: usize,
    /// Verbosity level forwarded to the engine.
    pub verbose: u32,
    /// Whether the engine should pin its threads.
    pub set_affinity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "native".to_string(),
            threads: 0,
            verbose: 0,
            set_affinity: false,
        }
    }
}

impl EngineConfig {
    /// Engine configuration string, e.g. `threads=4,verbose=0,set_affinity=0`.
    pub fn to_config_string(&self) -> String {
        format!(
            "threads={},verbose={},set_affinity={}",
            self.threads,
            self.verbose,
            u32::from(self.set_affinity)
        )
    }
}

/// Process-level runtime configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tile worker threads. 0 = one per logical core.
    pub num_threads: usize,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Intersection engine settings.
    pub engine: EngineConfig,
    /// Default log filter used by [`RuntimeConfig::init_logging`].
    pub log_level: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            tile_size: DEFAULT_TILE_SIZE,
            engine: EngineConfig::default(),
            log_level: None,
        }
    }
}

impl RuntimeConfig {
    /// Check values that would make the runtime unusable.
    pub fn validate(&self) -> Result<()> {
        validate_tile_size(self.tile_size)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Initialize logging using `log_level` as the default filter.
    pub fn init_logging(&self) {
        crate::core::logging::init_with_filter(self.log_level.as_deref().unwrap_or("info"));
    }
}

/// Tile edge lengths must lie in `1..=MAX_TILE_SIZE`.
pub fn validate_tile_size(tile_size: u32) -> Result<()> {
    if !(1..=MAX_TILE_SIZE).contains(&tile_size) {
        return Err(Error::Config(format!(
            "tile_size {} outside 1..={}",
            tile_size, MAX_TILE_SIZE
        )));
    }
    Ok(())
}
