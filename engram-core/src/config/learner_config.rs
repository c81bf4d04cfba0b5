use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::params::{DmdAlgorithm, ProcessingParameters};

/// Defaults applied when a coupling-update request leaves fields unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingDefaults {
    pub gain: f64,
    pub max_strength: f64,
    pub enforce_stability: bool,
    /// Allowed drop of the system stability index below the held reference.
    pub stability_epsilon: f64,
}

impl Default for CouplingDefaults {
    fn default() -> Self {
        Self {
            gain: defaults::DEFAULT_COUPLING_GAIN,
            max_strength: defaults::DEFAULT_MAX_COUPLING_STRENGTH,
            enforce_stability: true,
            stability_epsilon: defaults::DEFAULT_STABILITY_EPSILON,
        }
    }
}

/// Spectral-learner (KCL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub max_modes: usize,
    pub default_parameters: ProcessingParameters,
    pub coupling_update_interval_secs: u64,
    /// Drop modes with |lambda| > 1 instead of retaining them.
    pub drop_unstable_modes: bool,
    pub dmd_algorithm: DmdAlgorithm,
    /// Log a warning when the system stability index falls below this.
    pub stability_alarm_threshold: f64,
    pub default_coupling: CouplingDefaults,
    /// Directory watched for trace files dropped by external agents.
    pub trace_inbox_dir: Option<PathBuf>,
    /// Process ingested inbox traces without an explicit request.
    pub auto_processing: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            max_modes: defaults::DEFAULT_MAX_MODES,
            default_parameters: ProcessingParameters::default(),
            coupling_update_interval_secs: defaults::DEFAULT_COUPLING_UPDATE_INTERVAL_SECS,
            drop_unstable_modes: false,
            dmd_algorithm: DmdAlgorithm::Standard,
            stability_alarm_threshold: defaults::DEFAULT_STABILITY_ALARM_THRESHOLD,
            default_coupling: CouplingDefaults::default(),
            trace_inbox_dir: None,
            auto_processing: false,
        }
    }
}
