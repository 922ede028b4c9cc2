//! Topology configuration structures

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GoalError;

/// Default location of the topology config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".tws/topology.toml";

/// Top-level topology configuration from .tws/topology.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Handover behaviour
    #[serde(default)]
    pub handover: HandoverConfig,

    /// Where goal lifecycle notifications go
    #[serde(default)]
    pub events: EventsConfig,
}

/// Handover configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoverConfig {
    /// Use dynamic handover when the primary goes into the case. When false
    /// the static (link-drop) handover goal is used instead.
    #[serde(default)]
    pub dynamic_handover_supported: bool,
}

/// Notification output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Append goal lifecycle notifications as JSONL to this file
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl TopologyConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, GoalError> {
        let content = std::fs::read_to_string(path).map_err(|source| GoalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| GoalError::ConfigError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Try to load config, returning default if file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self, GoalError> {
        if !path.exists() {
            tracing::debug!("no topology config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_static_handover() {
        let config = TopologyConfig::default();
        assert!(!config.handover.dynamic_handover_supported);
        assert!(config.events.log_path.is_none());
    }

    #[test]
    fn load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, "[handover]\ndynamic_handover_supported = true\n").unwrap();

        let config = TopologyConfig::load(&path).unwrap();
        assert!(config.handover.dynamic_handover_supported);
        assert_eq!(config.events, EventsConfig::default());
    }

    #[test]
    fn load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = TopologyConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TopologyConfig::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, "[handover\n").unwrap();
        assert!(matches!(
            TopologyConfig::load_or_default(&path),
            Err(GoalError::ConfigError { .. })
        ));
    }
}
