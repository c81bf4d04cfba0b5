//! Dynamic mode decomposition: batch baseline, incremental running basis,
//! eigen machinery, and mode combination.

mod batch;
mod combine;
mod eig;
mod incremental;
pub mod modes;

pub use batch::{batch_dmd, BatchResult};
pub use combine::combine_modes;
pub use eig::eigenpairs;
pub use incremental::IncrementalBasis;
pub use modes::{build_mode, RawMode};

use nalgebra::{Complex, DMatrix, DVector};

use engram_core::errors::{EngramResult, SpectralError};
use engram_core::models::ActivationTrace;

pub type C64 = Complex<f64>;

/// Snapshot pair matrices X = [x0..x_{n-1}], Y = [x1..x_n], one column per
/// snapshot, rows over the given concept basis. Pairs never bridge two
/// traces.
pub fn snapshot_matrices(
    traces: &[ActivationTrace],
    basis: &[u32],
) -> EngramResult<(DMatrix<f64>, DMatrix<f64>)> {
    let mut x_cols: Vec<DVector<f64>> = Vec::new();
    let mut y_cols: Vec<DVector<f64>> = Vec::new();
    for trace in traces {
        let dense: Vec<DVector<f64>> = trace
            .snapshots
            .iter()
            .map(|s| DVector::from_vec(s.activation.to_dense(basis)))
            .collect();
        for pair in dense.windows(2) {
            x_cols.push(pair[0].clone());
            y_cols.push(pair[1].clone());
        }
    }
    if x_cols.len() < 2 {
        return Err(SpectralError::NotEnoughSnapshots {
            got: x_cols.len(),
            need: 2,
        }
        .into());
    }
    Ok((
        DMatrix::from_columns(&x_cols),
        DMatrix::from_columns(&y_cols),
    ))
}
