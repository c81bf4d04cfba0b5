use serde::{Deserialize, Serialize};

use crate::activation::ConceptActivation;

/// One activation observation inside a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationSnapshot {
    /// Seconds since the trace started.
    pub relative_time_secs: f64,
    pub activation: ConceptActivation,
    /// Set when this snapshot crossed an energy sign change.
    pub transition: bool,
    /// Local Lyapunov estimate from successive pattern divergence.
    pub local_lyapunov: f64,
}

/// An ordered sequence of activation snapshots at a fixed sampling rate.
///
/// Owned by its producer until handed to the spectral learner, after which
/// it is a read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationTrace {
    pub snapshots: Vec<ActivationSnapshot>,
    pub sampling_rate_hz: f64,
    /// Which producer emitted this trace ("replay", an agent id, ...).
    pub source: String,
}

impl ActivationTrace {
    /// Seconds between consecutive snapshots.
    pub fn dt(&self) -> f64 {
        if self.sampling_rate_hz > 0.0 {
            1.0 / self.sampling_rate_hz
        } else {
            1.0
        }
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Ascending union of concept ids active anywhere in the trace.
    pub fn concept_basis(&self) -> Vec<u32> {
        let mut basis: Vec<u32> = self
            .snapshots
            .iter()
            .flat_map(|s| s.activation.active_ids())
            .collect();
        basis.sort_unstable();
        basis.dedup();
        basis
    }
}
