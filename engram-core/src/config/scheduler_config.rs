use serde::{Deserialize, Serialize};

use super::defaults;
use crate::episode::EpisodeFilter;
use crate::params::{ReplayParameters, TemperatureCalendar};

/// Consolidation-scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run consolidation on the cron schedule without explicit requests.
    pub auto_schedule: bool,
    /// Cron expression for recurring consolidation.
    pub schedule_cron: Option<String>,
    pub default_replay_params: ReplayParameters,
    pub max_concurrent_jobs: usize,
    pub max_episodes_per_job: usize,
    /// Defer scheduled launches while load is at or above the threshold.
    pub adaptive_scheduling: bool,
    pub load_threshold: usize,
    /// Filter applied before selection when a request carries none.
    pub default_filter: EpisodeFilter,
    /// Episodes below this energy are never auto-selected.
    pub energy_threshold: f64,
    pub temperature_calendars: Vec<TemperatureCalendar>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_schedule: false,
            schedule_cron: None,
            default_replay_params: ReplayParameters::default(),
            max_concurrent_jobs: defaults::DEFAULT_MAX_CONCURRENT_JOBS,
            max_episodes_per_job: defaults::DEFAULT_MAX_EPISODES_PER_JOB,
            adaptive_scheduling: false,
            load_threshold: defaults::DEFAULT_LOAD_THRESHOLD,
            default_filter: EpisodeFilter::default(),
            energy_threshold: defaults::DEFAULT_ENERGY_THRESHOLD,
            temperature_calendars: Vec::new(),
        }
    }
}
