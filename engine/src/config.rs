use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub(crate) const fn default_true() -> bool {
    true
}

const fn default_event_budget() -> usize {
    64
}

fn default_realization_prefix() -> String {
    "realization-".to_string()
}

/// Tunables of a state manager and its local environment.
///
/// Every key is optional; an empty document yields [`EngineConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Abort older solves when a newer one is requested and ignore their
    /// results.
    #[serde(default = "default_true")]
    pub fence_stale_solves: bool,
    /// Maximum task events handled per `poll_events` call.
    #[serde(default = "default_event_budget")]
    pub event_budget: usize,
    /// Share one solve between identical models.
    #[serde(default = "default_true")]
    pub memoize_solutions: bool,
    /// Prefix of realization node ids, followed by the mesh id.
    #[serde(default = "default_realization_prefix")]
    pub realization_prefix: String,
    /// Resolve newly introduced observation meshes only when this manager
    /// owns them.
    #[serde(default = "default_true")]
    pub owner_filter_new_meshes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fence_stale_solves: true,
            event_budget: default_event_budget(),
            memoize_solutions: true,
            realization_prefix: default_realization_prefix(),
            owner_filter_new_meshes: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
