use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Aggregate vault statistics over an optional time range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultStats {
    pub total_episodes: usize,
    pub total_bytes: u64,
    pub by_tag: HashMap<String, usize>,
    pub by_source: HashMap<String, usize>,
    pub mean_energy: f64,
    /// Age histogram: whole-hour bucket -> count.
    pub age_hours_histogram: HashMap<u64, usize>,
}

/// Aggregate replay statistics over completed consolidation jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStats {
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_cancelled: usize,
    pub episodes_processed: usize,
    pub episodes_failed: usize,
    pub total_energy_improvement: f64,
    pub edges_pruned: usize,
}
