//! Batch (exact) DMD baseline.

use nalgebra::{DMatrix, DVector};

use engram_core::errors::{EngramResult, SpectralError};
use engram_core::params::ProcessingParameters;

use super::eig::eigenpairs;
use super::modes::RawMode;
use super::C64;

/// Upper bound on the SVD workspace before refusing with a suggestion.
const MAX_SVD_CELLS: usize = 4_000_000;

/// Outcome of the rank truncation decision.
#[derive(Debug)]
pub struct BatchResult {
    pub modes: Vec<RawMode>,
    pub effective_rank: usize,
    /// True when sigma_min (or the column count) forced a lower rank than
    /// requested.
    pub rank_truncated: bool,
}

/// Exact DMD over snapshot pair matrices.
///
/// X = U S V^T (thin); Atilde = U^T Y V S^-1; eigenpairs of Atilde;
/// Phi = Y V S^-1 w, unit-normalised.
pub fn batch_dmd(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    params: &ProcessingParameters,
) -> EngramResult<BatchResult> {
    let (n, m) = (x.nrows(), x.ncols());
    if n * m > MAX_SVD_CELLS {
        return Err(SpectralError::WorkspaceTooLarge {
            rows: n,
            cols: m,
            suggested_rank: params.dmd_rank.min(32),
        }
        .into());
    }

    let svd = x.clone().svd(true, true);
    let u = svd.u.ok_or(SpectralError::EigenFailed { rank: params.dmd_rank })?;
    let v_t = svd.v_t.ok_or(SpectralError::EigenFailed { rank: params.dmd_rank })?;
    let sigma = svd.singular_values;

    let significant = sigma.iter().filter(|&&s| s > params.min_singular_value).count();
    let rank = params.dmd_rank.min(significant);
    if rank == 0 {
        return Err(SpectralError::NotEnoughSnapshots { got: m, need: 2 }.into());
    }
    let rank_truncated = rank < params.dmd_rank;

    let u_r = u.columns(0, rank).into_owned();
    let v_r = v_t.rows(0, rank).transpose().into_owned();
    let sigma_inv = DMatrix::from_diagonal(&DVector::from_iterator(
        rank,
        sigma.iter().take(rank).map(|&s| 1.0 / s),
    ));

    // Y V S^-1 appears twice: once projected for Atilde, once for Phi.
    let yvs = y * &v_r * &sigma_inv;
    let a_tilde = u_r.transpose() * &yvs;

    let yvs_c = yvs.map(|v| C64::new(v, 0.0));
    let mut modes = Vec::new();
    for (lambda, w) in eigenpairs(&a_tilde)? {
        let mut phi: DVector<C64> = &yvs_c * &w;
        let norm = phi.norm();
        if norm > 1e-12 {
            phi /= C64::new(norm, 0.0);
        }
        let mut raw = RawMode::new(lambda, phi);
        raw.sparsify(params.l1_strength);
        modes.push(raw);
    }

    Ok(BatchResult {
        modes,
        effective_rank: rank,
        rank_truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive x_{k+1} = A x_k and collect the pair matrices.
    fn linear_system_pairs(a: &DMatrix<f64>, x0: DVector<f64>, steps: usize) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut states = vec![x0];
        for k in 0..steps {
            let next = a * &states[k];
            states.push(next);
        }
        let x = DMatrix::from_columns(&states[..steps]);
        let y = DMatrix::from_columns(&states[1..=steps]);
        (x, y)
    }

    #[test]
    fn recovers_eigenvalues_of_a_linear_system() {
        // Block-diagonal A: eigenvalues 0.9 and 0.95 e^{+-i pi/8}.
        let theta: f64 = std::f64::consts::PI / 8.0;
        let r = 0.95;
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.9, 0.0, 0.0,
                0.0, r * theta.cos(), -r * theta.sin(),
                0.0, r * theta.sin(), r * theta.cos(),
            ],
        );
        let x0 = DVector::from_vec(vec![1.0, 0.7, -0.3]);
        let (x, y) = linear_system_pairs(&a, x0, 40);

        let result = batch_dmd(&x, &y, &ProcessingParameters::default()).unwrap();
        let mut mags: Vec<f64> = result.modes.iter().map(|m| m.lambda.norm()).collect();
        mags.sort_by(|p, q| p.partial_cmp(q).unwrap());
        assert_eq!(result.modes.len(), 2); // conjugate pair deduplicated
        assert!((mags[0] - 0.9).abs() < 1e-3);
        assert!((mags[1] - 0.95).abs() < 1e-3);

        let oscillating = result
            .modes
            .iter()
            .find(|m| m.lambda.im.abs() > 1e-6)
            .unwrap();
        assert!((oscillating.lambda.arg() - theta).abs() / theta < 0.01);
    }

    #[test]
    fn rank_is_truncated_by_singular_values() {
        // Rank-1 data: x is the same column repeated.
        let col = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = DMatrix::from_columns(&[col.clone(), col.clone(), col.clone()]);
        let y = x.clone();
        let params = ProcessingParameters {
            dmd_rank: 3,
            ..Default::default()
        };
        let result = batch_dmd(&x, &y, &params).unwrap();
        assert_eq!(result.effective_rank, 1);
        assert!(result.rank_truncated);
        // The single mode is the identity action on that column: lambda 1.
        assert!((result.modes[0].lambda.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_workspace_is_refused() {
        let x = DMatrix::zeros(4000, 2000);
        let y = DMatrix::zeros(4000, 2000);
        let err = batch_dmd(&x, &y, &ProcessingParameters::default()).unwrap_err();
        assert_eq!(
            err.kind(),
            engram_core::errors::ErrorKind::ResourceExhausted
        );
    }
}
