//! Incremental path: a running thin SVD of the observed snapshots,
//! updated one column at a time (Brand rank-1 updates) and bounded to the
//! requested rank. The reduced eigenproblem is re-run against a sliding
//! window of snapshot pairs; V is recovered as X^T U S^-1.
//!
//! The update is exact up to truncation; no learning rate is involved
//! (mode-dominance decay happens at retention time instead).

use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};

/// Running low-rank basis over recently observed snapshots.
#[derive(Debug, Clone)]
pub struct IncrementalBasis {
    /// n x r orthonormal column basis.
    u: DMatrix<f64>,
    /// Retained singular values, descending.
    sigma: DVector<f64>,
    window_x: VecDeque<DVector<f64>>,
    window_y: VecDeque<DVector<f64>>,
    max_rank: usize,
    window_cap: usize,
}

impl IncrementalBasis {
    pub fn new(dimension: usize, max_rank: usize, window_cap: usize) -> Self {
        Self {
            u: DMatrix::zeros(dimension, 0),
            sigma: DVector::zeros(0),
            window_x: VecDeque::new(),
            window_y: VecDeque::new(),
            max_rank: max_rank.max(1),
            window_cap: window_cap.max(2),
        }
    }

    /// Rows of the basis (concept dimension).
    pub fn dimension(&self) -> usize {
        self.u.nrows()
    }

    /// Retained rank so far.
    pub fn rank(&self) -> usize {
        self.sigma.len()
    }

    /// Smallest retained singular value, when any.
    pub fn min_singular(&self) -> Option<f64> {
        self.sigma.iter().copied().fold(None, |acc, s| {
            Some(acc.map_or(s, |m: f64| m.min(s)))
        })
    }

    /// Whether the running basis has degraded below sigma_min.
    pub fn needs_fallback(&self, sigma_min: f64) -> bool {
        match self.min_singular() {
            Some(s) => s < sigma_min,
            None => false,
        }
    }

    /// Remap rows onto a grown concept basis (old rows keep their data,
    /// new concepts start at zero).
    pub fn expand_basis(&mut self, old_basis: &[u32], new_basis: &[u32]) {
        if old_basis == new_basis {
            return;
        }
        let rank = self.u.ncols();
        let mut u = DMatrix::zeros(new_basis.len(), rank);
        for (old_row, concept) in old_basis.iter().enumerate() {
            if let Ok(new_row) = new_basis.binary_search(concept) {
                for c in 0..rank {
                    u[(new_row, c)] = self.u[(old_row, c)];
                }
            }
        }
        self.u = u;
        let remap = |window: &VecDeque<DVector<f64>>| {
            window
                .iter()
                .map(|col| {
                    let mut grown = DVector::zeros(new_basis.len());
                    for (old_row, concept) in old_basis.iter().enumerate() {
                        if let Ok(new_row) = new_basis.binary_search(concept) {
                            grown[new_row] = col[old_row];
                        }
                    }
                    grown
                })
                .collect::<VecDeque<_>>()
        };
        self.window_x = remap(&self.window_x);
        self.window_y = remap(&self.window_y);
    }

    /// Feed one snapshot pair: window bookkeeping plus a Brand update of
    /// the running SVD with the X column.
    pub fn observe_pair(&mut self, x: DVector<f64>, y: DVector<f64>) {
        if self.window_x.len() >= self.window_cap {
            self.window_x.pop_front();
            self.window_y.pop_front();
        }
        self.brand_update(&x);
        self.window_x.push_back(x);
        self.window_y.push_back(y);
    }

    fn brand_update(&mut self, column: &DVector<f64>) {
        let rank = self.sigma.len();
        if rank == 0 {
            let norm = column.norm();
            if norm > 0.0 {
                self.u = DMatrix::from_columns(&[column / norm]);
                self.sigma = DVector::from_vec(vec![norm]);
            }
            return;
        }

        let m = self.u.transpose() * column;
        let p = column - &self.u * &m;
        let rho = p.norm();

        // Augmented core matrix K = [[diag(S), m], [0, rho]].
        let mut k = DMatrix::zeros(rank + 1, rank + 1);
        for i in 0..rank {
            k[(i, i)] = self.sigma[i];
            k[(i, rank)] = m[i];
        }
        k[(rank, rank)] = rho;

        let svd = k.svd(true, false);
        let Some(u_k) = svd.u else { return };
        let s_k = svd.singular_values;

        let j = if rho > 1e-12 {
            p / rho
        } else {
            DVector::zeros(self.u.nrows())
        };
        let mut augmented = DMatrix::zeros(self.u.nrows(), rank + 1);
        augmented.columns_mut(0, rank).copy_from(&self.u);
        augmented.column_mut(rank).copy_from(&j);
        let updated = augmented * u_k;

        let keep = self.max_rank.min(rank + 1);
        self.u = updated.columns(0, keep).into_owned();
        self.sigma = DVector::from_iterator(keep, s_k.iter().take(keep).copied());
    }

    /// The reduced operator over the current window:
    /// Atilde = U^T Y V S^-1 with V = X^T U S^-1.
    /// `None` until at least two pairs were observed.
    pub fn reduced_operator(&self) -> Option<(DMatrix<f64>, DMatrix<f64>)> {
        if self.window_x.len() < 2 || self.sigma.is_empty() {
            return None;
        }
        let x_cols: Vec<DVector<f64>> = self.window_x.iter().cloned().collect();
        let y_cols: Vec<DVector<f64>> = self.window_y.iter().cloned().collect();
        let x = DMatrix::from_columns(&x_cols);
        let y = DMatrix::from_columns(&y_cols);
        let sigma_inv = DMatrix::from_diagonal(&self.sigma.map(|s| {
            if s > 1e-12 {
                1.0 / s
            } else {
                0.0
            }
        }));
        let v = x.transpose() * &self.u * &sigma_inv;
        let projection = y * v * &sigma_inv; // Y V S^-1, n x r
        let a_tilde = self.u.transpose() * &projection;
        Some((a_tilde, projection))
    }

    /// Window contents for the batch fallback.
    pub fn window(&self) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        (
            self.window_x.iter().cloned().collect(),
            self.window_y.iter().cloned().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(a: &DMatrix<f64>, x0: DVector<f64>, steps: usize) -> Vec<DVector<f64>> {
        let mut states = vec![x0];
        for k in 0..steps {
            states.push(a * &states[k]);
        }
        states
    }

    #[test]
    fn running_basis_stays_orthonormal() {
        let a = DMatrix::from_row_slice(2, 2, &[0.9, 0.1, -0.1, 0.8]);
        let states = drive(&a, DVector::from_vec(vec![1.0, 0.5]), 20);
        let mut basis = IncrementalBasis::new(2, 2, 64);
        for pair in states.windows(2) {
            basis.observe_pair(pair[0].clone(), pair[1].clone());
        }
        let gram = basis.u.transpose() * &basis.u;
        let identity = DMatrix::identity(basis.rank(), basis.rank());
        assert!((gram - identity).norm() < 1e-8);
    }

    #[test]
    fn reduced_operator_matches_the_true_dynamics() {
        let a = DMatrix::from_row_slice(2, 2, &[0.9, 0.05, 0.0, 0.7]);
        let states = drive(&a, DVector::from_vec(vec![1.0, -0.4]), 30);
        let mut basis = IncrementalBasis::new(2, 2, 64);
        for pair in states.windows(2) {
            basis.observe_pair(pair[0].clone(), pair[1].clone());
        }
        let (a_tilde, _) = basis.reduced_operator().unwrap();
        // Full rank retained: eigenvalues of Atilde match A's (0.9, 0.7).
        let mut eig: Vec<f64> = a_tilde
            .complex_eigenvalues()
            .iter()
            .map(|l| l.norm())
            .collect();
        eig.sort_by(|p, q| p.partial_cmp(q).unwrap());
        assert!((eig[0] - 0.7).abs() < 1e-6);
        assert!((eig[1] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn rank_is_bounded() {
        let mut basis = IncrementalBasis::new(8, 3, 64);
        for i in 0..20 {
            let x = DVector::from_fn(8, |r, _| ((r + i) as f64).sin());
            let y = DVector::from_fn(8, |r, _| ((r + i + 1) as f64).sin());
            basis.observe_pair(x, y);
        }
        assert!(basis.rank() <= 3);
    }

    #[test]
    fn degenerate_data_triggers_fallback() {
        let col = DVector::from_vec(vec![1.0, 1.0]);
        let mut basis = IncrementalBasis::new(2, 2, 64);
        for _ in 0..5 {
            basis.observe_pair(col.clone(), col.clone());
        }
        // Rank-1 data: the second singular value is ~0.
        assert!(basis.needs_fallback(1e-6) || basis.rank() == 1);
    }

    #[test]
    fn basis_expansion_preserves_rows() {
        let mut basis = IncrementalBasis::new(2, 2, 64);
        basis.observe_pair(
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::from_vec(vec![0.9, 0.0]),
        );
        basis.expand_basis(&[3, 7], &[1, 3, 7]);
        assert_eq!(basis.dimension(), 3);
        // Row for concept 3 moved from index 0 to index 1.
        assert!((basis.u[(1, 0)].abs() - 1.0).abs() < 1e-9);
        assert_eq!(basis.u[(0, 0)], 0.0);
    }
}
