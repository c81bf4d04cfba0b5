use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engram_core::activation::ConceptActivation;
use engram_core::config::LearnerConfig;
use engram_core::job::Job;
use engram_core::models::{ActivationTrace, OscillatorCoupling, ProcessingReport, SpectralMode};
use engram_core::params::ProcessingParameters;
use engram_spectral::stability::StabilityAnalysis;

use super::ApiError;

/// ProcessActivationBatch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessBatchRequest {
    pub traces: Vec<ActivationTrace>,
    /// Also consume traces captured by recent consolidation cycles.
    pub include_replay_traces: bool,
    pub parameters: Option<ProcessingParameters>,
    /// Rewrite couplings from the fresh spectrum on success.
    pub update_couplings: bool,
    /// Attach a stability analysis to the stored result.
    pub generate_stability: bool,
    pub sync: bool,
    pub description: Option<String>,
    pub client_id: Option<String>,
}

/// ProcessActivationBatch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBatchResponse {
    pub job_id: String,
    pub accepted: bool,
    pub trace_count: usize,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub status: Option<ProcessingStatus>,
}

/// GetProcessingStatus response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub job: Job,
    pub report: Option<ProcessingReport>,
    pub stability: Option<StabilityAnalysis>,
}

/// GetSpectralModes request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralModesRequest {
    pub max_modes: usize,
    /// "dominance" | "magnitude" | "frequency" | "sparsity".
    pub sort_by: String,
    pub min_eigenvalue_magnitude: f64,
    pub exclude_unstable: bool,
}

impl Default for SpectralModesRequest {
    fn default() -> Self {
        Self {
            max_modes: usize::MAX,
            sort_by: "dominance".to_string(),
            min_eigenvalue_magnitude: 0.0,
            exclude_unstable: false,
        }
    }
}

/// GetSpectralModes response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralModesResponse {
    pub modes: Vec<SpectralMode>,
    pub total_retained: usize,
}

/// UpdateOscillatorCouplings request; unset numeric fields fall back to
/// the configured coupling defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateCouplingsRequest {
    pub max_pairs: Option<usize>,
    pub apply_immediately: Option<bool>,
    pub coupling_gain: Option<f64>,
    pub min_eigenvalue_magnitude: Option<f64>,
    pub enforce_stability: Option<bool>,
    pub max_coupling_strength: Option<f64>,
}

/// UpdateOscillatorCouplings response envelope. `success` is false when
/// the stability gate rejected the proposal; nothing was mutated then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouplingResponse {
    pub success: bool,
    pub applied: bool,
    pub couplings: Vec<OscillatorCoupling>,
    pub stability_before: f64,
    pub stability_after: f64,
    pub stability_improvement: f64,
    pub error: Option<ApiError>,
}

/// PredictActivations request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub initial_state: ConceptActivation,
    pub timesteps: usize,
    pub timestep_size_secs: f64,
    #[serde(default)]
    pub include_uncertainty: bool,
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
}

fn default_max_modes() -> usize {
    usize::MAX
}

/// PredictActivations response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub basis: Vec<u32>,
    pub states: Vec<Vec<f64>>,
    pub uncertainty: Option<Vec<Vec<f64>>>,
}

/// GetStabilityAnalysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityRequest {
    pub max_modes: usize,
    pub include_details: bool,
    pub include_recommendations: bool,
}

impl Default for StabilityRequest {
    fn default() -> Self {
        Self {
            max_modes: usize::MAX,
            include_details: false,
            include_recommendations: true,
        }
    }
}

/// ResetSystem request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetRequest {
    pub keep_modes: bool,
    pub keep_couplings: bool,
    pub initial_modes: Vec<SpectralMode>,
}

/// ResetSystem response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub modes_kept: usize,
    pub couplings_kept: usize,
}

/// GetKclStats response: learner counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KclStats {
    pub batches_processed: u64,
    pub snapshots_seen: u64,
    pub modes_retained: usize,
    pub couplings: usize,
    pub stability_index: f64,
    pub history_samples: usize,
}

pub type KclConfig = LearnerConfig;
