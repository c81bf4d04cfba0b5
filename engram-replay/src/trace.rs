//! Trace buffer: ordered activation snapshots owned by their producer
//! until frozen into an `ActivationTrace` for the spectral learner.

use engram_core::activation::ConceptActivation;
use engram_core::models::{ActivationSnapshot, ActivationTrace};

/// Bounded, ordered snapshot buffer.
///
/// `record` derives relative time from the sampling rate and computes the
/// transition flag and a local Lyapunov estimate from the previous two
/// patterns; `push` takes caller-supplied values (external agents).
#[derive(Debug)]
pub struct TraceBuffer {
    snapshots: Vec<ActivationSnapshot>,
    sampling_rate_hz: f64,
    capacity: usize,
    source: String,
    last_energy_sign: Option<bool>,
    last_divergence: Option<f64>,
    previous: Option<ConceptActivation>,
}

impl TraceBuffer {
    pub fn new(source: impl Into<String>, sampling_rate_hz: f64, capacity: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            sampling_rate_hz,
            capacity,
            source: source.into(),
            last_energy_sign: None,
            last_divergence: None,
            previous: None,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.snapshots.len() >= self.capacity
    }

    /// Append a snapshot with caller-supplied flags.
    pub fn push(&mut self, activation: ConceptActivation, transition: bool, local_lyapunov: f64) {
        if self.is_full() {
            return;
        }
        let dt = if self.sampling_rate_hz > 0.0 {
            1.0 / self.sampling_rate_hz
        } else {
            1.0
        };
        self.snapshots.push(ActivationSnapshot {
            relative_time_secs: self.snapshots.len() as f64 * dt,
            activation,
            transition,
            local_lyapunov,
        });
    }

    /// Append a snapshot, deriving the transition flag from an energy sign
    /// change and the Lyapunov estimate from successive divergences.
    pub fn record(&mut self, activation: ConceptActivation, energy: f64) {
        let sign = energy >= 0.0;
        let transition = self
            .last_energy_sign
            .map(|prev| prev != sign)
            .unwrap_or(false);
        self.last_energy_sign = Some(sign);

        let divergence = self
            .previous
            .as_ref()
            .map(|prev| 1.0 - prev.cosine_similarity(&activation));
        let lyapunov = match (self.last_divergence, divergence) {
            (Some(d0), Some(d1)) if d0 > 1e-12 && d1 > 1e-12 => (d1 / d0).ln(),
            _ => 0.0,
        };
        self.last_divergence = divergence;
        self.previous = Some(activation.clone());

        self.push(activation, transition, lyapunov);
    }

    /// Hand the buffer over as a read-only trace.
    pub fn freeze(self) -> ActivationTrace {
        ActivationTrace {
            snapshots: self.snapshots,
            sampling_rate_hz: self.sampling_rate_hz,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse(ids: Vec<u32>) -> ConceptActivation {
        ConceptActivation::SparseIds { active: ids }
    }

    #[test]
    fn relative_times_follow_sampling_rate() {
        let mut buf = TraceBuffer::new("test", 2.0, 16);
        buf.push(sparse(vec![1]), false, 0.0);
        buf.push(sparse(vec![2]), false, 0.0);
        let trace = buf.freeze();
        assert_eq!(trace.snapshots[0].relative_time_secs, 0.0);
        assert_eq!(trace.snapshots[1].relative_time_secs, 0.5);
        assert_eq!(trace.dt(), 0.5);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut buf = TraceBuffer::new("test", 1.0, 2);
        for i in 0..5 {
            buf.push(sparse(vec![i]), false, 0.0);
        }
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn transition_flags_energy_sign_change() {
        let mut buf = TraceBuffer::new("test", 1.0, 16);
        buf.record(sparse(vec![1]), -0.5);
        buf.record(sparse(vec![1, 2]), -0.2);
        buf.record(sparse(vec![2]), 0.3);
        let trace = buf.freeze();
        assert!(!trace.snapshots[0].transition);
        assert!(!trace.snapshots[1].transition);
        assert!(trace.snapshots[2].transition);
    }

    #[test]
    fn basis_is_union_of_active_ids() {
        let mut buf = TraceBuffer::new("test", 1.0, 16);
        buf.push(sparse(vec![3, 5]), false, 0.0);
        buf.push(sparse(vec![1, 5]), false, 0.0);
        let trace = buf.freeze();
        assert_eq!(trace.concept_basis(), vec![1, 3, 5]);
    }
}
