//! Operator settings loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Operator settings for `lumashard`.
///
/// ```toml
/// [sharding]
/// map_path = "/etc/lumadb/shard.json"
/// num_groups = 3
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub sharding: ShardingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShardingSettings {
    pub map_path: PathBuf,
    pub num_groups: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Read the shard map document named by `map_path`.
    pub fn read_shard_map(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.sharding.map_path)?)
    }
}
