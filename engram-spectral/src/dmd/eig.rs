//! Eigenpairs of the reduced operator.
//!
//! Eigenvalues come from the real Schur form; eigenvectors from shifted
//! inverse iteration on the complexified matrix. Conjugate pairs are
//! deduplicated: only eigenvalues with non-negative imaginary part are
//! kept, which is the representative a real-valued system reports.

use nalgebra::{DMatrix, DVector};

use engram_core::errors::{EngramResult, SpectralError};

use super::C64;

const INVERSE_ITERATIONS: usize = 4;
const CONJUGATE_TOL: f64 = 1e-12;

/// Compute (lambda, w) pairs of a small square real matrix.
pub fn eigenpairs(a: &DMatrix<f64>) -> EngramResult<Vec<(C64, DVector<C64>)>> {
    let rank = a.nrows();
    if rank == 0 || a.ncols() != rank {
        return Err(SpectralError::EigenFailed { rank }.into());
    }
    let eigenvalues = a.clone().complex_eigenvalues();
    let a_c = a.map(|v| C64::new(v, 0.0));

    let mut pairs = Vec::new();
    for lambda in eigenvalues.iter() {
        // One representative per conjugate pair.
        if lambda.im < -CONJUGATE_TOL {
            continue;
        }
        let vector = inverse_iteration(&a_c, *lambda, rank)?;
        pairs.push((*lambda, vector));
    }
    Ok(pairs)
}

/// Shifted inverse iteration: a few solves against (A - (lambda+delta)I)
/// starting from a fixed deterministic vector.
fn inverse_iteration(
    a_c: &DMatrix<C64>,
    lambda: C64,
    rank: usize,
) -> EngramResult<DVector<C64>> {
    // Small shift keeps the matrix invertible at an exact eigenvalue.
    let shift = lambda + C64::new(1e-10 * (1.0 + lambda.norm()), 1e-10);
    let mut shifted = a_c.clone();
    for i in 0..rank {
        shifted[(i, i)] -= shift;
    }
    let lu = shifted.lu();

    // Deterministic non-degenerate start.
    let mut v: DVector<C64> =
        DVector::from_fn(rank, |i, _| C64::new(1.0, (i as f64 + 1.0) * 0.1));
    let norm = v.norm();
    v /= C64::new(norm, 0.0);

    for _ in 0..INVERSE_ITERATIONS {
        match lu.solve(&v) {
            Some(next) => {
                let norm = next.norm();
                if !norm.is_finite() || norm == 0.0 {
                    return Err(SpectralError::EigenFailed { rank }.into());
                }
                v = next / C64::new(norm, 0.0);
            }
            None => return Err(SpectralError::EigenFailed { rank }.into()),
        }
    }
    Ok(v)
}
