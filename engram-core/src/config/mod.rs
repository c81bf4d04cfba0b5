//! Engram configuration: one struct per subsystem, all fields defaulted,
//! loadable from TOML.

pub mod defaults;
mod learner_config;
mod scheduler_config;
mod vault_config;

pub use learner_config::{CouplingDefaults, LearnerConfig};
pub use scheduler_config::SchedulerConfig;
pub use vault_config::{FsyncMode, VaultConfig};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngramError, EngramResult};

/// Top-level configuration for the substrate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramConfig {
    pub vault: VaultConfig,
    pub scheduler: SchedulerConfig,
    pub learner: LearnerConfig,
}

impl EngramConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> EngramResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| EngramError::Serialization {
            message: format!("config parse failed: {e}"),
        })
    }

    /// Serialize back to TOML (used by config round-trip tests and dumps).
    pub fn to_toml(&self) -> EngramResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngramError::Serialization {
            message: format!("config serialize failed: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = EngramConfig::default();
        let raw = config.to_toml().unwrap();
        let back: EngramConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.vault.segment_size_bytes, config.vault.segment_size_bytes);
        assert_eq!(back.scheduler.max_concurrent_jobs, config.scheduler.max_concurrent_jobs);
        assert_eq!(back.learner.max_modes, config.learner.max_modes);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = "[vault]\nsegment_size_bytes = 1024\n";
        let config: EngramConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.vault.segment_size_bytes, 1024);
        assert_eq!(
            config.scheduler.max_concurrent_jobs,
            SchedulerConfig::default().max_concurrent_jobs
        );
    }
}
