//! Match configuration authored as TOML.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use glam::Vec2;
use rampart_core::{RoundConfig, SpawnRegion, VictoryConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_INTER_SPAWN_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_SEED: u64 = 0x5EED;

/// Errors raised while loading a match configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read match config {}", path.display())]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid TOML match configuration.
    #[error("failed to parse match config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration parsed but describes an unusable match.
    #[error("invalid match config: {0}")]
    Invalid(String),
}

/// Spawner parameters of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnerSettings {
    /// Delay separating consecutive spawns within a wave.
    #[serde(with = "rampart_core::seconds", default = "default_inter_spawn_delay")]
    pub inter_spawn_delay: Duration,
    /// Wait between a death and the round-completion check.
    #[serde(with = "rampart_core::seconds", default = "default_settle_delay")]
    pub settle_delay: Duration,
    /// Seed of the spawner's random stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Regions enemies are placed in.
    #[serde(default = "default_regions")]
    pub regions: Vec<SpawnRegion>,
}

impl Default for SpawnerSettings {
    fn default() -> Self {
        Self {
            inter_spawn_delay: DEFAULT_INTER_SPAWN_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            seed: DEFAULT_SEED,
            regions: default_regions(),
        }
    }
}

fn default_inter_spawn_delay() -> Duration {
    DEFAULT_INTER_SPAWN_DELAY
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_regions() -> Vec<SpawnRegion> {
    vec![SpawnRegion::from_corners(
        Vec2::new(-20.0, 18.0),
        Vec2::new(20.0, 22.0),
    )]
}

/// Everything needed to set up a match.
///
/// Leaving `rounds` out selects the default round sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// How rounds and the match are won.
    #[serde(default)]
    pub victory: VictoryConfig,
    /// Ordered round list.
    #[serde(default)]
    pub rounds: Option<Vec<RoundConfig>>,
    /// Spawner parameters.
    #[serde(default)]
    pub spawner: SpawnerSettings,
}

impl MatchConfig {
    /// Parses and validates a configuration from TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot describe a playable match.
    ///
    /// Round numbering is not checked here; the round manager substitutes
    /// defaults for a malformed round list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, region) in self.spawner.regions.iter().enumerate() {
            if !(region.min().is_finite() && region.max().is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "spawn region {index} has non-finite corners"
                )));
            }
            if !(region.max() - region.min()).is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "spawn region {index} is too large to sample"
                )));
            }
        }
        Ok(())
    }
}

/// Reads and parses the match configuration stored at `path`.
pub fn load_match_config(path: impl AsRef<Path>) -> Result<MatchConfig, ConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    MatchConfig::from_toml_str(&source)
}
