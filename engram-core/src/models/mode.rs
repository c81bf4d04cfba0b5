use serde::{Deserialize, Serialize};

use crate::activation::ConceptId;

/// A concept that carries significant weight in a mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantConcept {
    pub concept: ConceptId,
    /// Magnitude |phi_i|.
    pub weight: f64,
    /// arg(phi_i), radians.
    pub phase_shift: f64,
}

/// One eigenvalue/eigenvector pair of the fitted operator with its
/// derived attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralMode {
    pub id: String,
    /// Complex eigenvalue lambda.
    pub eigenvalue_re: f64,
    pub eigenvalue_im: f64,
    /// Ascending concept basis the vector is expressed over.
    pub basis: Vec<ConceptId>,
    /// Real part of the mode vector, parallel to `basis`.
    pub vector: Vec<f64>,
    /// Sampling interval the eigenvalue was fitted at, seconds.
    pub dt_secs: f64,
    /// Natural frequency arg(lambda) / (2 pi dt), Hz.
    pub frequency_hz: f64,
    /// Damping ratio; positive means decaying.
    pub damping_ratio: f64,
    /// Growth factor |lambda|.
    pub growth_factor: f64,
    /// Fraction of vector entries with negligible magnitude.
    pub sparsity: f64,
    /// Time constant -dt / ln|lambda|, seconds; infinite at |lambda| = 1.
    pub time_constant_secs: f64,
    /// 1 - 2 max(0, |lambda| - 1), clamped to [-1, 1].
    pub stability_index: f64,
    /// |lambda| * ||phi||; ordering key for retention.
    pub dominance: f64,
    /// Concepts with significant magnitude, with weights and phases.
    pub dominant_concepts: Vec<DominantConcept>,
}

impl SpectralMode {
    /// Eigenvalue magnitude.
    pub fn magnitude(&self) -> f64 {
        (self.eigenvalue_re * self.eigenvalue_re + self.eigenvalue_im * self.eigenvalue_im).sqrt()
    }

    /// Whether the mode sits inside (or on) the unit circle.
    pub fn is_stable(&self) -> bool {
        self.magnitude() <= 1.0
    }

    /// Continuous-time Lyapunov exponent estimate Re(log lambda) / dt.
    pub fn lyapunov_exponent(&self) -> f64 {
        let mag = self.magnitude();
        if mag <= 0.0 || self.dt_secs <= 0.0 {
            return f64::NEG_INFINITY;
        }
        mag.ln() / self.dt_secs
    }
}
