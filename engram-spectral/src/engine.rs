//! SpectralEngine: owns the retained mode set and the incremental basis,
//! runs processing batches, and serves mode queries and predictions.

use nalgebra::DVector;
use tracing::{debug, info, warn};

use engram_core::activation::ConceptActivation;
use engram_core::config::LearnerConfig;
use engram_core::errors::{EngramResult, SpectralError};
use engram_core::models::{ActivationTrace, ProcessingOutcome, ProcessingReport, SpectralMode};
use engram_core::params::ProcessingParameters;

use crate::dmd::{
    batch_dmd, combine_modes, eigenpairs, snapshot_matrices, IncrementalBasis, RawMode, C64,
};
use crate::dmd::modes::build_mode;
use crate::predict::{self, Prediction};
use crate::stability;

/// Sort key for mode queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSort {
    #[default]
    Dominance,
    Magnitude,
    Frequency,
    Sparsity,
}

/// Mode listing query.
#[derive(Debug, Clone)]
pub struct ModeQuery {
    pub max_modes: usize,
    pub sort_by: ModeSort,
    pub min_eigenvalue_magnitude: f64,
    pub exclude_unstable: bool,
}

impl Default for ModeQuery {
    fn default() -> Self {
        Self {
            max_modes: usize::MAX,
            sort_by: ModeSort::Dominance,
            min_eigenvalue_magnitude: 0.0,
            exclude_unstable: false,
        }
    }
}

/// Serializable engine state (for `spectrum/modes.bin`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModeSetState {
    pub basis: Vec<u32>,
    pub dt_secs: f64,
    pub mode_seq: u64,
    pub modes: Vec<SpectralMode>,
    /// Complex mode vectors as (re, im) pairs, parallel to `modes`.
    pub vectors: Vec<Vec<(f64, f64)>>,
}

/// The spectral learner. One writer during an update; any number of
/// readers of the retained modes (the service wraps this in a RwLock).
pub struct SpectralEngine {
    config: LearnerConfig,
    basis: Vec<u32>,
    dt_secs: f64,
    modes: Vec<SpectralMode>,
    vectors: Vec<DVector<C64>>,
    incremental: Option<IncrementalBasis>,
    mode_seq: u64,
    batches_processed: u64,
    snapshots_seen: u64,
}

impl SpectralEngine {
    pub fn new(config: LearnerConfig) -> Self {
        Self {
            config,
            basis: Vec::new(),
            dt_secs: 1.0,
            modes: Vec::new(),
            vectors: Vec::new(),
            incremental: None,
            mode_seq: 0,
            batches_processed: 0,
            snapshots_seen: 0,
        }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LearnerConfig) {
        self.config = config;
    }

    pub fn modes(&self) -> &[SpectralMode] {
        &self.modes
    }

    pub fn basis(&self) -> &[u32] {
        &self.basis
    }

    pub fn dt_secs(&self) -> f64 {
        self.dt_secs
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches_processed
    }

    pub fn snapshots_seen(&self) -> u64 {
        self.snapshots_seen
    }

    /// Run one processing batch over the traces.
    pub fn process(
        &mut self,
        traces: &[ActivationTrace],
        params: &ProcessingParameters,
    ) -> EngramResult<ProcessingReport> {
        params.validate()?;
        let snapshot_count: usize = traces.iter().map(|t| t.len()).sum();
        if snapshot_count < 2 {
            return Err(SpectralError::NotEnoughSnapshots {
                got: snapshot_count,
                need: 2,
            }
            .into());
        }
        self.dt_secs = traces
            .iter()
            .find(|t| !t.is_empty())
            .map(|t| t.dt())
            .unwrap_or(1.0);

        // Grow the shared basis with any new concepts.
        let old_basis = self.basis.clone();
        let mut basis = self.basis.clone();
        for trace in traces {
            basis.extend(trace.concept_basis());
        }
        basis.sort_unstable();
        basis.dedup();
        let basis_grew = basis != old_basis;
        self.basis = basis;

        let (mut raw_modes, effective_rank, outcome) = if params.use_incremental {
            self.process_incremental(traces, params, &old_basis, basis_grew)?
        } else {
            let (x, y) = snapshot_matrices(traces, &self.basis)?;
            let result = batch_dmd(&x, &y, params)?;
            let outcome = if result.rank_truncated {
                ProcessingOutcome::RankTruncated
            } else {
                ProcessingOutcome::Clean
            };
            (result.modes, result.effective_rank, outcome)
        };

        // Incremental retention: prior modes decay in dominance and
        // compete with the fresh ones; the batch path replaces the set.
        if params.use_incremental {
            let decay = 1.0 - params.learning_rate;
            for (mode, vector) in self.modes.iter().zip(&self.vectors) {
                let mut carried = RawMode::new(
                    C64::new(mode.eigenvalue_re, mode.eigenvalue_im),
                    self.padded_vector(vector, mode),
                );
                carried.dominance = mode.dominance * decay;
                raw_modes.push(carried);
            }
        }

        let (mut kept, merged) = combine_modes(raw_modes, params.mode_combination_threshold);
        kept.sort_by(|a, b| {
            b.dominance
                .partial_cmp(&a.dominance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if self.config.drop_unstable_modes {
            let before = kept.len();
            kept.retain(|m| m.lambda.norm() <= 1.0);
            if kept.len() < before {
                debug!(dropped = before - kept.len(), "dropped unstable modes");
            }
        }
        kept.truncate(params.max_modes.min(self.config.max_modes));

        let mut rebuilt = Vec::with_capacity(kept.len());
        for raw in &kept {
            let id = format!("mode-{}", self.mode_seq);
            self.mode_seq += 1;
            rebuilt.push(build_mode(id, raw, &self.basis, self.dt_secs));
        }
        self.modes = rebuilt;
        self.vectors = kept.into_iter().map(|raw| raw.phi).collect();

        // One-step reconstruction error over the training pairs.
        let prediction_error = match snapshot_matrices(traces, &self.basis) {
            Ok((x, y)) => self.one_step_error(&x, &y),
            Err(_) => 0.0,
        };

        let stability_index = stability::system_index(&self.modes, &[]);
        if stability_index < self.config.stability_alarm_threshold {
            warn!(
                stability_index,
                threshold = self.config.stability_alarm_threshold,
                "stability below alarm threshold"
            );
        }

        self.batches_processed += 1;
        self.snapshots_seen += snapshot_count as u64;

        let report = ProcessingReport {
            snapshots_consumed: snapshot_count,
            traces_consumed: traces.len(),
            effective_rank,
            modes_retained: self.modes.len(),
            modes_merged: merged,
            outcome,
            dominant_eigenvalues: self.modes.iter().map(|m| m.magnitude()).collect(),
            prediction_error,
            mean_mode_sparsity: if self.modes.is_empty() {
                0.0
            } else {
                self.modes.iter().map(|m| m.sparsity).sum::<f64>() / self.modes.len() as f64
            },
            stability_index,
        };
        info!(
            modes = report.modes_retained,
            rank = report.effective_rank,
            error = report.prediction_error,
            "spectral batch processed"
        );
        Ok(report)
    }

    fn process_incremental(
        &mut self,
        traces: &[ActivationTrace],
        params: &ProcessingParameters,
        old_basis: &[u32],
        basis_grew: bool,
    ) -> EngramResult<(Vec<RawMode>, usize, ProcessingOutcome)> {
        if self.incremental.is_none() {
            self.incremental = Some(IncrementalBasis::new(
                self.basis.len(),
                params.dmd_rank,
                params.snapshot_window,
            ));
        }
        // Reborrow after the insert above.
        let state = self.incremental.as_mut().ok_or(SpectralError::NoModes)?;
        if basis_grew {
            state.expand_basis(old_basis, &self.basis);
        }

        for trace in traces {
            let dense: Vec<DVector<f64>> = trace
                .snapshots
                .iter()
                .map(|s| DVector::from_vec(s.activation.to_dense(&self.basis)))
                .collect();
            for pair in dense.windows(2) {
                state.observe_pair(pair[0].clone(), pair[1].clone());
            }
        }

        if state.needs_fallback(params.min_singular_value) {
            // Basis degraded: batch DMD over the retained window.
            let (x_cols, y_cols) = state.window();
            if x_cols.len() < 2 {
                return Err(SpectralError::NotEnoughSnapshots {
                    got: x_cols.len(),
                    need: 2,
                }
                .into());
            }
            let x = nalgebra::DMatrix::from_columns(&x_cols);
            let y = nalgebra::DMatrix::from_columns(&y_cols);
            let result = batch_dmd(&x, &y, params)?;
            warn!("incremental basis below sigma_min, fell back to batch");
            return Ok((
                result.modes,
                result.effective_rank,
                ProcessingOutcome::DowngradedToBatch,
            ));
        }

        let Some((a_tilde, projection)) = state.reduced_operator() else {
            return Err(SpectralError::NotEnoughSnapshots { got: 1, need: 2 }.into());
        };
        let rank = a_tilde.nrows();
        let projection_c = projection.map(|v| C64::new(v, 0.0));
        let mut modes = Vec::new();
        for (lambda, w) in eigenpairs(&a_tilde)? {
            let mut phi: DVector<C64> = &projection_c * &w;
            let norm = phi.norm();
            if norm > 1e-12 {
                phi /= C64::new(norm, 0.0);
            }
            let mut raw = RawMode::new(lambda, phi);
            raw.sparsify(params.l1_strength);
            modes.push(raw);
        }
        Ok((modes, rank, ProcessingOutcome::Clean))
    }

    /// Pad a stored vector to the current basis length (the basis only
    /// grows, and it grows at the tail after sorting old entries in).
    fn padded_vector(&self, vector: &DVector<C64>, mode: &SpectralMode) -> DVector<C64> {
        if vector.len() == self.basis.len() {
            return vector.clone();
        }
        let mut padded = DVector::from_element(self.basis.len(), C64::new(0.0, 0.0));
        for (i, concept) in mode.basis.iter().enumerate() {
            if let Ok(row) = self.basis.binary_search(concept) {
                padded[row] = vector[i];
            }
        }
        padded
    }

    fn one_step_error(&self, x: &nalgebra::DMatrix<f64>, y: &nalgebra::DMatrix<f64>) -> f64 {
        if self.vectors.is_empty() {
            return 1.0;
        }
        let lambdas: Vec<C64> = self
            .modes
            .iter()
            .map(|m| C64::new(m.eigenvalue_re, m.eigenvalue_im))
            .collect();
        let mut err_sum = 0.0;
        let mut norm_sum = 0.0;
        for k in 0..x.ncols() {
            let x_k: Vec<f64> = x.column(k).iter().copied().collect();
            let Ok(p) = predict::predict(
                &self.vectors,
                &lambdas,
                self.dt_secs,
                &self.basis,
                &x_k,
                1,
                self.dt_secs,
                false,
            ) else {
                return 1.0;
            };
            let predicted = &p.states[0];
            let actual = y.column(k);
            err_sum += predicted
                .iter()
                .zip(actual.iter())
                .map(|(p, a)| (p - a) * (p - a))
                .sum::<f64>()
                .sqrt();
            norm_sum += actual.norm();
        }
        if norm_sum > 1e-12 {
            err_sum / norm_sum
        } else {
            0.0
        }
    }

    /// Filtered, sorted mode listing.
    pub fn query_modes(&self, query: &ModeQuery) -> Vec<SpectralMode> {
        let mut modes: Vec<SpectralMode> = self
            .modes
            .iter()
            .filter(|m| m.magnitude() >= query.min_eigenvalue_magnitude)
            .filter(|m| !query.exclude_unstable || m.is_stable())
            .cloned()
            .collect();
        let key = |m: &SpectralMode| match query.sort_by {
            ModeSort::Dominance => m.dominance,
            ModeSort::Magnitude => m.magnitude(),
            ModeSort::Frequency => m.frequency_hz.abs(),
            ModeSort::Sparsity => m.sparsity,
        };
        modes.sort_by(|a, b| {
            key(b)
                .partial_cmp(&key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        modes.truncate(query.max_modes);
        modes
    }

    /// Predict future activations from an initial pattern.
    pub fn predict(
        &self,
        initial: &ConceptActivation,
        timesteps: usize,
        step_secs: f64,
        include_uncertainty: bool,
        max_modes: usize,
    ) -> EngramResult<Prediction> {
        if self.modes.is_empty() {
            return Err(SpectralError::NoModes.into());
        }
        let count = max_modes.min(self.modes.len());
        let vectors: Vec<DVector<C64>> = self.vectors.iter().take(count).cloned().collect();
        let lambdas: Vec<C64> = self
            .modes
            .iter()
            .take(count)
            .map(|m| C64::new(m.eigenvalue_re, m.eigenvalue_im))
            .collect();
        let x0 = initial.to_dense(&self.basis);
        predict::predict(
            &vectors,
            &lambdas,
            self.dt_secs,
            &self.basis,
            &x0,
            timesteps,
            step_secs,
            include_uncertainty,
        )
    }

    /// Drop learner state. `keep_modes` retains the mode set; seeding
    /// replaces it. The incremental basis always resets.
    pub fn reset(&mut self, keep_modes: bool, initial_modes: Vec<SpectralMode>) -> usize {
        self.incremental = None;
        if !keep_modes {
            self.modes.clear();
            self.vectors.clear();
        }
        if !initial_modes.is_empty() {
            self.vectors = initial_modes.iter().map(vector_from_mode).collect();
            self.basis = initial_modes
                .first()
                .map(|m| m.basis.clone())
                .unwrap_or_default();
            self.modes = initial_modes;
        }
        self.modes.len()
    }

    /// Serializable snapshot of the mode set.
    pub fn snapshot_state(&self) -> ModeSetState {
        ModeSetState {
            basis: self.basis.clone(),
            dt_secs: self.dt_secs,
            mode_seq: self.mode_seq,
            modes: self.modes.clone(),
            vectors: self
                .vectors
                .iter()
                .map(|v| v.iter().map(|c| (c.re, c.im)).collect())
                .collect(),
        }
    }

    /// Restore a persisted mode set. The incremental basis restarts.
    pub fn restore_state(&mut self, state: ModeSetState) {
        self.basis = state.basis;
        self.dt_secs = state.dt_secs;
        self.mode_seq = state.mode_seq;
        self.modes = state.modes;
        self.vectors = state
            .vectors
            .into_iter()
            .map(|v| DVector::from_vec(v.into_iter().map(|(re, im)| C64::new(re, im)).collect()))
            .collect();
        self.incremental = None;
    }
}

/// Rebuild a complex vector from a mode's public record: dominant
/// concepts carry magnitude and phase; everything else keeps its real
/// part.
fn vector_from_mode(mode: &SpectralMode) -> DVector<C64> {
    let mut v: Vec<C64> = mode.vector.iter().map(|&re| C64::new(re, 0.0)).collect();
    for dom in &mode.dominant_concepts {
        if let Ok(i) = mode.basis.binary_search(&dom.concept) {
            v[i] = C64::from_polar(dom.weight, dom.phase_shift);
        }
    }
    DVector::from_vec(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::models::ActivationSnapshot;

    /// Trace of a scalar decay on one concept: x_{k+1} = 0.8 x_k encoded
    /// as strengths on concept 3.
    fn decay_trace(steps: usize) -> ActivationTrace {
        let mut snapshots = Vec::new();
        let mut value = 1.0f64;
        for k in 0..steps {
            snapshots.push(ActivationSnapshot {
                relative_time_secs: k as f64,
                activation: ConceptActivation::SparseIdsWithStrengths {
                    active: vec![3],
                    strengths: vec![value.max(0.0).min(1.0)],
                },
                transition: false,
                local_lyapunov: 0.0,
            });
            value *= 0.8;
        }
        ActivationTrace {
            snapshots,
            sampling_rate_hz: 1.0,
            source: "test".into(),
        }
    }

    #[test]
    fn learns_a_decay_mode_from_a_trace() {
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        let report = engine
            .process(&[decay_trace(20)], &ProcessingParameters::default())
            .unwrap();
        assert_eq!(report.traces_consumed, 1);
        assert!(report.modes_retained >= 1);
        let top = &engine.modes()[0];
        assert!((top.magnitude() - 0.8).abs() < 1e-6);
        assert!(top.is_stable());
        assert!(report.prediction_error < 1e-6);
    }

    #[test]
    fn too_few_snapshots_is_invalid() {
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        let err = engine
            .process(&[decay_trace(1)], &ProcessingParameters::default())
            .unwrap_err();
        assert_eq!(err.kind(), engram_core::errors::ErrorKind::InvalidInput);
    }

    #[test]
    fn query_excludes_unstable_modes() {
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        engine
            .process(&[decay_trace(20)], &ProcessingParameters::default())
            .unwrap();
        let all = engine.query_modes(&ModeQuery::default());
        let stable_only = engine.query_modes(&ModeQuery {
            exclude_unstable: true,
            ..Default::default()
        });
        assert!(stable_only.len() <= all.len());
        assert!(stable_only.iter().all(|m| m.is_stable()));
    }

    #[test]
    fn state_round_trips() {
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        engine
            .process(&[decay_trace(20)], &ProcessingParameters::default())
            .unwrap();
        let state = engine.snapshot_state();
        let mut restored = SpectralEngine::new(LearnerConfig::default());
        restored.restore_state(state.clone());
        assert_eq!(restored.modes().len(), engine.modes().len());
        assert_eq!(restored.basis(), engine.basis());
        let again = restored.snapshot_state();
        assert_eq!(
            bincode::serialize(&state).unwrap(),
            bincode::serialize(&again).unwrap()
        );
    }

    #[test]
    fn reset_clears_or_keeps() {
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        engine
            .process(&[decay_trace(20)], &ProcessingParameters::default())
            .unwrap();
        assert!(engine.reset(true, Vec::new()) >= 1);
        assert_eq!(engine.reset(false, Vec::new()), 0);
        assert!(engine.modes().is_empty());
    }

    #[test]
    fn incremental_path_tracks_the_same_dynamics() {
        let params = ProcessingParameters {
            use_incremental: true,
            dmd_rank: 4,
            ..Default::default()
        };
        let mut engine = SpectralEngine::new(LearnerConfig::default());
        let report = engine.process(&[decay_trace(30)], &params).unwrap();
        assert!(report.modes_retained >= 1);
        let top = &engine.modes()[0];
        assert!((top.magnitude() - 0.8).abs() < 1e-3);
    }
}
