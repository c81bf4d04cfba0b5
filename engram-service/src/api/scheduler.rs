use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engram_core::episode::EpisodeFilter;
use engram_core::job::Job;
use engram_core::models::{ConceptDelta, ReplayStats};
use engram_core::params::ReplayParameters;

/// StartConsolidation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConsolidationRequest {
    /// Wait for the final status instead of returning immediately.
    pub sync: bool,
    /// Episode filter; the scheduler default applies when absent.
    pub filter: Option<EpisodeFilter>,
    /// Batch cap; the scheduler default applies at zero.
    pub max_episodes: usize,
    pub replay_params: Option<ReplayParameters>,
    /// Include per-concept deltas in the stored result.
    pub emit_deltas: bool,
    pub description: Option<String>,
    pub client_id: Option<String>,
}

/// StartConsolidation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConsolidationResponse {
    pub job_id: String,
    pub accepted: bool,
    pub selected_episodes: usize,
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Final status when `sync` was requested.
    pub status: Option<ConsolidationStatus>,
}

/// GetConsolidationStatus response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationStatus {
    pub job: Job,
    pub episodes_processed: usize,
    pub episodes_failed: usize,
    pub episodes_remaining: usize,
    pub total_energy_improvement: f64,
    pub edges_pruned: usize,
    pub sparsity_after: f64,
    /// Present when the request asked for deltas.
    pub deltas: Option<Vec<ConceptDelta>>,
}

/// CancelConsolidation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelConsolidationResponse {
    pub cancelled: bool,
}

/// ScheduleConsolidation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConsolidationRequest {
    pub scheduled_time: DateTime<Utc>,
    pub request: StartConsolidationRequest,
    /// Cron expression for recurrence (5-field accepted).
    pub recurrence: Option<String>,
}

/// ScheduleConsolidation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConsolidationResponse {
    pub scheduled_job_id: String,
    pub scheduled_time: DateTime<Utc>,
}

pub type ReplayStatsResponse = ReplayStats;
