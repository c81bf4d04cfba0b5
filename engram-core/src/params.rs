//! Tunable parameters for replay and spectral processing.

use serde::{Deserialize, Serialize};

use crate::errors::{EngramResult, ReplayError, SpectralError};

/// How temperature evolves across annealing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSchedule {
    /// T <- T * cooling_rate each step.
    Geometric,
    /// T = T0 / ln(e + step).
    Logarithmic,
    /// Lookup by episode age bucket in the configured calendars.
    Calendar,
}

/// A temperature calendar keyed by episode age.
///
/// When calendars overlap in age range, the first matching calendar in
/// declaration order wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureCalendar {
    pub name: String,
    /// Inclusive lower age bound, hours.
    pub min_age_hours: u64,
    /// Exclusive upper age bound, hours.
    pub max_age_hours: u64,
    /// Temperature per step; the last entry holds for later steps.
    pub temperatures: Vec<f64>,
}

impl TemperatureCalendar {
    /// Whether an episode of the given age falls in this calendar.
    pub fn covers(&self, age_hours: u64) -> bool {
        age_hours >= self.min_age_hours && age_hours < self.max_age_hours
    }

    /// Temperature at an annealing step (clamped to the last entry).
    pub fn temperature_at(&self, step: usize) -> f64 {
        match self.temperatures.get(step) {
            Some(&t) => t,
            None => *self.temperatures.last().unwrap_or(&0.0),
        }
    }
}

/// Parameters for one consolidation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayParameters {
    /// Initial temperature T0.
    pub initial_temperature: f64,
    /// Geometric cooling rate rho in (0, 1].
    pub cooling_rate: f64,
    /// Annealing steps per episode.
    pub annealing_steps: usize,
    /// Learning rate eta.
    pub learning_rate: f64,
    /// Negative samples K per step.
    pub negative_samples: usize,
    /// L1 decay strength lambda.
    pub l1_strength: f64,
    /// Scale eta down when the energy trend flattens.
    pub adaptive_rate: bool,
    /// Early-stop threshold delta on the sliding-window energy improvement.
    pub min_energy_improvement: f64,
    pub schedule: TemperatureSchedule,
    pub calendars: Vec<TemperatureCalendar>,
    /// Bias updates toward edges near the prune threshold.
    pub prioritize_threshold_edges: bool,
    /// Fraction of failed episodes above which the whole job fails.
    pub max_failure_fraction: f64,
    /// When set, the pruning pass adopts this threshold; otherwise the
    /// graph keeps its current one.
    pub prune_threshold: Option<f64>,
}

impl Default for ReplayParameters {
    fn default() -> Self {
        Self {
            initial_temperature: 1.0,
            cooling_rate: 0.95,
            annealing_steps: 50,
            learning_rate: 0.01,
            negative_samples: 5,
            l1_strength: 0.001,
            adaptive_rate: false,
            min_energy_improvement: 1e-6,
            schedule: TemperatureSchedule::Geometric,
            calendars: Vec::new(),
            prioritize_threshold_edges: false,
            max_failure_fraction: 0.5,
            prune_threshold: None,
        }
    }
}

impl ReplayParameters {
    /// Reject contradictory or non-finite parameters before a job starts.
    pub fn validate(&self) -> EngramResult<()> {
        let bad = |reason: String| -> EngramResult<()> {
            Err(ReplayError::InvalidParameters { reason }.into())
        };
        if !self.initial_temperature.is_finite() || self.initial_temperature <= 0.0 {
            return bad(format!(
                "initial_temperature {} must be positive",
                self.initial_temperature
            ));
        }
        if !(0.0..=1.0).contains(&self.cooling_rate) || self.cooling_rate == 0.0 {
            return bad(format!("cooling_rate {} outside (0, 1]", self.cooling_rate));
        }
        if self.annealing_steps == 0 {
            return bad("annealing_steps must be at least 1".to_string());
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return bad(format!("learning_rate {} must be >= 0", self.learning_rate));
        }
        if self.l1_strength < 0.0 {
            return bad(format!("l1_strength {} must be >= 0", self.l1_strength));
        }
        if !(0.0..=1.0).contains(&self.max_failure_fraction) {
            return bad(format!(
                "max_failure_fraction {} outside [0, 1]",
                self.max_failure_fraction
            ));
        }
        if self.schedule == TemperatureSchedule::Calendar && self.calendars.is_empty() {
            return bad("calendar schedule needs at least one calendar".to_string());
        }
        Ok(())
    }
}

/// Which DMD variant the learner runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmdAlgorithm {
    Standard,
    Exact,
    Compressed,
    Incremental,
}

/// Parameters for one spectral processing batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParameters {
    /// Target truncation rank r.
    pub dmd_rank: usize,
    /// Use the incremental (running-basis) path.
    pub use_incremental: bool,
    /// L1 strength applied when sparsifying mode vectors.
    pub l1_strength: f64,
    /// Maximum modes retained, M.
    pub max_modes: usize,
    /// Singular values below this are discarded.
    pub min_singular_value: f64,
    /// Eigenvalue/vector proximity for mode merging, tau.
    pub mode_combination_threshold: f64,
    /// Compute the stability analysis alongside the update.
    pub compute_stability: bool,
    /// Steps ahead used when reporting prediction error.
    pub prediction_horizon: usize,
    /// Dominance decay applied to prior modes on incremental updates.
    /// Drives mode-weight decay only; the basis update itself is exact.
    pub learning_rate: f64,
    /// Cap on retained snapshot columns for the running basis.
    pub snapshot_window: usize,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            dmd_rank: 8,
            use_incremental: false,
            l1_strength: 0.0,
            max_modes: 16,
            min_singular_value: 1e-8,
            mode_combination_threshold: 0.05,
            compute_stability: true,
            prediction_horizon: 10,
            learning_rate: 0.1,
            snapshot_window: 512,
        }
    }
}

impl ProcessingParameters {
    pub fn validate(&self) -> EngramResult<()> {
        let bad = |reason: String| -> EngramResult<()> {
            Err(SpectralError::InvalidParameters { reason }.into())
        };
        if self.dmd_rank == 0 {
            return bad("dmd_rank must be at least 1".to_string());
        }
        if self.max_modes == 0 {
            return bad("max_modes must be at least 1".to_string());
        }
        if self.min_singular_value < 0.0 {
            return bad(format!(
                "min_singular_value {} must be >= 0",
                self.min_singular_value
            ));
        }
        if !(0.0..1.0).contains(&self.mode_combination_threshold) {
            return bad(format!(
                "mode_combination_threshold {} outside [0, 1)",
                self.mode_combination_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.learning_rate) {
            return bad(format!("learning_rate {} outside [0, 1]", self.learning_rate));
        }
        if self.snapshot_window < 2 {
            return bad("snapshot_window must be at least 2".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_replay_parameters_validate() {
        ReplayParameters::default().validate().unwrap();
    }

    #[test]
    fn calendar_schedule_requires_calendars() {
        let params = ReplayParameters {
            schedule: TemperatureSchedule::Calendar,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn calendar_lookup_clamps_to_last_entry() {
        let cal = TemperatureCalendar {
            name: "recent".into(),
            min_age_hours: 0,
            max_age_hours: 24,
            temperatures: vec![1.0, 0.5, 0.25],
        };
        assert_eq!(cal.temperature_at(1), 0.5);
        assert_eq!(cal.temperature_at(99), 0.25);
        assert!(cal.covers(0));
        assert!(!cal.covers(24));
    }

    #[test]
    fn zero_rank_is_rejected() {
        let params = ProcessingParameters {
            dmd_rank: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
