//! Raw eigenpairs and their elaboration into `SpectralMode`s.

use nalgebra::DVector;

use engram_core::constants::MODE_SPARSITY_EPSILON;
use engram_core::models::{DominantConcept, SpectralMode};

use super::C64;

/// Fraction of the peak magnitude a concept needs to count as dominant.
const DOMINANCE_FRACTION: f64 = 0.1;
/// Cap on the dominant-concept list per mode.
const MAX_DOMINANT: usize = 16;

/// An eigenpair straight out of the decomposition, before elaboration.
#[derive(Debug, Clone)]
pub struct RawMode {
    pub lambda: C64,
    /// Unit-norm complex mode vector over the basis.
    pub phi: DVector<C64>,
    /// Retention/ordering weight; starts at |lambda| * ||phi||.
    pub dominance: f64,
}

impl RawMode {
    pub fn new(lambda: C64, phi: DVector<C64>) -> Self {
        let dominance = lambda.norm() * phi.norm();
        Self {
            lambda,
            phi,
            dominance,
        }
    }

    /// Soft-threshold small entries, then renormalise. No-op at zero
    /// strength.
    pub fn sparsify(&mut self, l1_strength: f64) {
        if l1_strength <= 0.0 {
            return;
        }
        let peak = self.phi.iter().map(|c| c.norm()).fold(0.0f64, f64::max);
        if peak == 0.0 {
            return;
        }
        let cutoff = l1_strength * peak;
        for value in self.phi.iter_mut() {
            let mag = value.norm();
            *value = if mag <= cutoff {
                C64::new(0.0, 0.0)
            } else {
                *value * ((mag - cutoff) / mag)
            };
        }
        let norm = self.phi.norm();
        if norm > 0.0 {
            self.phi /= C64::new(norm, 0.0);
        }
    }
}

/// Elaborate a raw eigenpair into the public mode record.
pub fn build_mode(id: String, raw: &RawMode, basis: &[u32], dt_secs: f64) -> SpectralMode {
    let lambda = raw.lambda;
    let magnitude = lambda.norm();
    let phase = lambda.arg();
    let dt = if dt_secs > 0.0 { dt_secs } else { 1.0 };

    let frequency_hz = phase / (2.0 * std::f64::consts::PI * dt);

    // Continuous-time pole s = ln(lambda)/dt; damping ratio from its angle.
    let (damping_ratio, time_constant_secs) = if magnitude > 0.0 {
        let sigma = magnitude.ln() / dt;
        let omega = phase / dt;
        let s_norm = (sigma * sigma + omega * omega).sqrt();
        let zeta = if s_norm > 0.0 { -sigma / s_norm } else { 0.0 };
        let tau = if (magnitude - 1.0).abs() < 1e-12 {
            f64::INFINITY
        } else {
            -dt / magnitude.ln()
        };
        (zeta, tau)
    } else {
        (1.0, 0.0)
    };

    let stability_index = (1.0 - 2.0 * (magnitude - 1.0).max(0.0)).clamp(-1.0, 1.0);

    let peak = raw.phi.iter().map(|c| c.norm()).fold(0.0f64, f64::max);
    let sparsity = if peak > 0.0 {
        raw.phi
            .iter()
            .filter(|c| c.norm() < MODE_SPARSITY_EPSILON * peak.max(1.0))
            .count() as f64
            / raw.phi.len() as f64
    } else {
        1.0
    };

    let mut dominant: Vec<DominantConcept> = raw
        .phi
        .iter()
        .enumerate()
        .filter(|(_, c)| c.norm() >= DOMINANCE_FRACTION * peak && c.norm() > 0.0)
        .map(|(i, c)| DominantConcept {
            concept: basis[i],
            weight: c.norm(),
            phase_shift: c.arg(),
        })
        .collect();
    dominant.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    dominant.truncate(MAX_DOMINANT);

    SpectralMode {
        id,
        eigenvalue_re: lambda.re,
        eigenvalue_im: lambda.im,
        basis: basis.to_vec(),
        vector: raw.phi.iter().map(|c| c.re).collect(),
        dt_secs: dt,
        frequency_hz,
        damping_ratio,
        growth_factor: magnitude,
        sparsity,
        time_constant_secs,
        stability_index,
        dominance: raw.dominance,
        dominant_concepts: dominant,
    }
}
