use serde::{Deserialize, Serialize};

use super::ConceptDelta;

/// Result of one consolidation cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub episodes_selected: usize,
    pub episodes_processed: usize,
    pub episodes_failed: usize,
    pub episodes_skipped: usize,
    /// True when the cycle stopped at a cancellation safe point; the
    /// counters above cover everything applied before the stop.
    pub cancelled: bool,
    /// Sum of per-episode energy improvements.
    pub total_energy_improvement: f64,
    pub edges_pruned: usize,
    pub sparsity_before: f64,
    pub sparsity_after: f64,
    pub deltas: Vec<ConceptDelta>,
}

/// Whether a spectral batch ran cleanly or had to downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Requested path ran as asked.
    Clean,
    /// Incremental basis fell below min_singular_value; batch fallback ran.
    DowngradedToBatch,
    /// Rank was truncated below the requested dmd_rank.
    RankTruncated,
}

/// Result of one spectral processing batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub snapshots_consumed: usize,
    pub traces_consumed: usize,
    pub effective_rank: usize,
    pub modes_retained: usize,
    pub modes_merged: usize,
    pub outcome: ProcessingOutcome,
    /// Magnitudes of the dominant eigenvalues, descending.
    pub dominant_eigenvalues: Vec<f64>,
    /// One-step reconstruction error on the training window.
    pub prediction_error: f64,
    /// Mean sparsity across retained modes.
    pub mean_mode_sparsity: f64,
    /// System stability index after the update.
    pub stability_index: f64,
}

/// What startup recovery found and did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Bytes of partial trailing record truncated, if any.
    pub truncated_bytes: u64,
    /// Segment the truncation happened in.
    pub truncated_segment: Option<u64>,
    /// Whether indexes were rebuilt from the log.
    pub indexes_rebuilt: bool,
    /// Jobs transitioned to FAILED at startup.
    pub jobs_failed_on_recovery: usize,
}
