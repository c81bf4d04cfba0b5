//! Property tests for the stability index.

use proptest::prelude::*;

use engram_core::models::{DominantConcept, SpectralMode};
use engram_spectral::stability;

fn mode(id: usize, magnitude: f64) -> SpectralMode {
    SpectralMode {
        id: format!("m{id}"),
        eigenvalue_re: magnitude,
        eigenvalue_im: 0.0,
        basis: vec![id as u32],
        vector: vec![1.0],
        dt_secs: 1.0,
        frequency_hz: 0.0,
        damping_ratio: 0.0,
        growth_factor: magnitude,
        sparsity: 0.0,
        time_constant_secs: 1.0,
        stability_index: (1.0 - 2.0 * (magnitude - 1.0).max(0.0)).clamp(-1.0, 1.0),
        dominance: magnitude,
        dominant_concepts: vec![DominantConcept {
            concept: id as u32,
            weight: 1.0,
            phase_shift: 0.0,
        }],
    }
}

proptest! {
    // The index always sits in [-1, 1].
    #[test]
    fn index_is_bounded(mags in proptest::collection::vec(0.0f64..3.0, 0..8)) {
        let modes: Vec<SpectralMode> = mags.iter().enumerate().map(|(i, &m)| mode(i, m)).collect();
        let idx = stability::system_index(&modes, &[]);
        prop_assert!((-1.0..=1.0).contains(&idx));
    }

    // Exactly 1 iff every eigenvalue is inside (or on) the unit circle.
    #[test]
    fn index_is_one_iff_all_stable(mags in proptest::collection::vec(0.0f64..2.0, 1..8)) {
        let modes: Vec<SpectralMode> = mags.iter().enumerate().map(|(i, &m)| mode(i, m)).collect();
        let idx = stability::system_index(&modes, &[]);
        if mags.iter().all(|&m| m <= 1.0) {
            prop_assert_eq!(idx, 1.0);
        } else {
            prop_assert!(idx < 1.0);
        }
    }

    // Without couplings the index never beats the worst modal index.
    #[test]
    fn index_matches_worst_mode(mags in proptest::collection::vec(0.0f64..2.0, 1..8)) {
        let modes: Vec<SpectralMode> = mags.iter().enumerate().map(|(i, &m)| mode(i, m)).collect();
        let idx = stability::system_index(&modes, &[]);
        let worst = modes
            .iter()
            .map(|m| m.stability_index)
            .fold(1.0f64, f64::min);
        prop_assert!((idx - worst).abs() < 1e-12);
    }
}
