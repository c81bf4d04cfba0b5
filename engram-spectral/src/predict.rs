//! Modal prediction: project an initial state onto the retained modes,
//! advance the amplitudes through the eigenvalues, and reconstruct.

use nalgebra::{DMatrix, DVector};

use engram_core::constants::MARGINAL_STABILITY_BAND;
use engram_core::errors::{EngramResult, SpectralError};

use crate::dmd::C64;

/// A predicted activation series over the concept basis.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub basis: Vec<u32>,
    /// One dense state per requested timestep, over `basis`.
    pub states: Vec<Vec<f64>>,
    /// Per-step, per-concept uncertainty when requested.
    pub uncertainty: Option<Vec<Vec<f64>>>,
}

/// Project x0 onto the modes (b = Phi^+ x0), advance b_k = Lambda^k b,
/// reconstruct x_k = Re(Phi b_k).
///
/// `step_secs` need not equal the fitted dt: eigenvalues are raised to
/// the fractional power `step_secs / dt_secs`.
pub fn predict(
    vectors: &[DVector<C64>],
    lambdas: &[C64],
    dt_secs: f64,
    basis: &[u32],
    x0: &[f64],
    timesteps: usize,
    step_secs: f64,
    include_uncertainty: bool,
) -> EngramResult<Prediction> {
    if vectors.is_empty() {
        return Err(SpectralError::NoModes.into());
    }
    let n = basis.len();
    if x0.len() != n {
        return Err(SpectralError::InvalidParameters {
            reason: format!("initial state has {} entries, basis has {n}", x0.len()),
        }
        .into());
    }

    // The mode set carries one representative per conjugate pair; real
    // reconstruction needs both, so synthesize the partners here.
    let mut vectors: Vec<DVector<C64>> = vectors.to_vec();
    let mut lambdas: Vec<C64> = lambdas.to_vec();
    for i in 0..lambdas.len() {
        if lambdas[i].im.abs() > 1e-12 {
            lambdas.push(lambdas[i].conj());
            vectors.push(vectors[i].map(|c| c.conj()));
        }
    }
    let vectors = &vectors[..];
    let lambdas = &lambdas[..];

    let phi = DMatrix::from_columns(vectors);
    let x0_c = DVector::from_iterator(n, x0.iter().map(|&v| C64::new(v, 0.0)));

    let pinv = phi
        .clone()
        .svd(true, true)
        .pseudo_inverse(1e-12)
        .map_err(|_| SpectralError::EigenFailed {
            rank: vectors.len(),
        })?;
    let amplitudes = pinv * x0_c;

    // Fractional-power eigenvalues for the requested step size.
    let exponent = if dt_secs > 0.0 { step_secs / dt_secs } else { 1.0 };
    let stepped: Vec<C64> = lambdas
        .iter()
        .map(|l| {
            let (r, theta) = l.to_polar();
            C64::from_polar(r.powf(exponent), theta * exponent)
        })
        .collect();

    let mut states = Vec::with_capacity(timesteps);
    let mut uncertainty = include_uncertainty.then(|| Vec::with_capacity(timesteps));
    let mut b_k: Vec<C64> = amplitudes.iter().copied().collect();

    for _ in 0..timesteps {
        for (b, l) in b_k.iter_mut().zip(&stepped) {
            *b *= *l;
        }
        let mut state = vec![0.0f64; n];
        for (m, vector) in vectors.iter().enumerate() {
            for i in 0..n {
                state[i] += (vector[i] * b_k[m]).re;
            }
        }
        if let Some(unc) = uncertainty.as_mut() {
            unc.push(step_uncertainty(vectors, lambdas, &b_k, n));
        }
        states.push(state);
    }

    Ok(Prediction {
        basis: basis.to_vec(),
        states,
        uncertainty,
    })
}

/// Per-concept normalised variance of the contributions from modes near
/// or above the unit circle. Zero when fewer than two such modes exist.
fn step_uncertainty(
    vectors: &[DVector<C64>],
    lambdas: &[C64],
    b_k: &[C64],
    n: usize,
) -> Vec<f64> {
    let marginal: Vec<usize> = lambdas
        .iter()
        .enumerate()
        .filter(|(_, l)| l.norm() > 1.0 - MARGINAL_STABILITY_BAND)
        .map(|(m, _)| m)
        .collect();
    if marginal.len() < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let contributions: Vec<f64> = marginal
                .iter()
                .map(|&m| (vectors[m][i] * b_k[m]).norm())
                .collect();
            let mean = contributions.iter().sum::<f64>() / contributions.len() as f64;
            if mean < 1e-12 {
                return 0.0;
            }
            let var = contributions
                .iter()
                .map(|c| (c - mean) * (c - mean))
                .sum::<f64>()
                / contributions.len() as f64;
            var / (mean * mean)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_round_trips_on_a_modal_state() {
        // Two orthogonal real modes; x0 lies in their span.
        let v1 = DVector::from_vec(vec![C64::new(1.0, 0.0), C64::new(0.0, 0.0)]);
        let v2 = DVector::from_vec(vec![C64::new(0.0, 0.0), C64::new(1.0, 0.0)]);
        let lambdas = [C64::new(1.0, 0.0), C64::new(1.0, 0.0)];
        let x0 = [0.8, -0.3];
        let p = predict(&[v1, v2], &lambdas, 1.0, &[0, 1], &x0, 1, 1.0, false).unwrap();
        // Unit eigenvalues: one step reproduces x0.
        assert!((p.states[0][0] - 0.8).abs() < 1e-9);
        assert!((p.states[0][1] + 0.3).abs() < 1e-9);
    }

    #[test]
    fn decaying_mode_shrinks_geometrically() {
        let v = DVector::from_vec(vec![C64::new(1.0, 0.0)]);
        let lambdas = [C64::new(0.5, 0.0)];
        let p = predict(&[v], &lambdas, 1.0, &[0], &[1.0], 3, 1.0, false).unwrap();
        assert!((p.states[0][0] - 0.5).abs() < 1e-9);
        assert!((p.states[1][0] - 0.25).abs() < 1e-9);
        assert!((p.states[2][0] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn fractional_step_uses_partial_powers() {
        let v = DVector::from_vec(vec![C64::new(1.0, 0.0)]);
        let lambdas = [C64::new(0.25, 0.0)];
        // Half the fitted dt: one step applies lambda^0.5 = 0.5.
        let p = predict(&[v], &lambdas, 1.0, &[0], &[1.0], 1, 0.5, false).unwrap();
        assert!((p.states[0][0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn uncertainty_is_zero_without_marginal_modes() {
        let v = DVector::from_vec(vec![C64::new(1.0, 0.0)]);
        let lambdas = [C64::new(0.5, 0.0)];
        let p = predict(&[v], &lambdas, 1.0, &[0], &[1.0], 2, 1.0, true).unwrap();
        let unc = p.uncertainty.unwrap();
        assert!(unc.iter().flatten().all(|&u| u == 0.0));
    }

    #[test]
    fn dimension_mismatch_is_invalid_input() {
        let v = DVector::from_vec(vec![C64::new(1.0, 0.0)]);
        let err = predict(&[v], &[C64::new(0.5, 0.0)], 1.0, &[0], &[1.0, 2.0], 1, 1.0, false)
            .unwrap_err();
        assert_eq!(err.kind(), engram_core::errors::ErrorKind::InvalidInput);
    }
}
