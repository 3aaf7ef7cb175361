//! Dense symmetric kernels used by the alignment solver.
//!
//! Everything here operates on the T×T side of the problem (T = number of
//! timepoints), which stays small even when the raw feature axis is large,
//! so plain loops over `ndarray` buffers are enough — no external LAPACK
//! binding.

use ndarray::Array2;

/// Lower-triangular Cholesky factor of a symmetric positive-definite matrix.
pub struct Cholesky {
    factor: Array2<f32>,
}

/// Factor `a = L·Lᵀ`. Returns `None` when a non-positive pivot shows up,
/// i.e. the input was not positive definite.
pub fn cholesky(a: &Array2<f32>) -> Option<Cholesky> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut l = Array2::<f32>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(Cholesky { factor: l })
}

impl Cholesky {
    /// Solve `A·X = B` for every column of `B`.
    pub fn solve(&self, b: &Array2<f32>) -> Array2<f32> {
        let n = self.factor.nrows();
        debug_assert_eq!(b.nrows(), n);
        let cols = b.ncols();
        let l = &self.factor;
        let mut x = b.to_owned();

        for c in 0..cols {
            // Forward substitution: L·y = b
            for i in 0..n {
                let mut sum = x[[i, c]];
                for k in 0..i {
                    sum -= l[[i, k]] * x[[k, c]];
                }
                x[[i, c]] = sum / l[[i, i]];
            }
            // Back substitution: Lᵀ·x = y
            for i in (0..n).rev() {
                let mut sum = x[[i, c]];
                for k in (i + 1)..n {
                    sum -= l[[k, i]] * x[[k, c]];
                }
                x[[i, c]] = sum / l[[i, i]];
            }
        }
        x
    }
}

/// Eigendecomposition of a symmetric matrix: eigenvalues in descending
/// order, eigenvectors as the matching orthonormal columns of `vectors`.
pub struct Eigh {
    pub values: Vec<f32>,
    pub vectors: Array2<f32>,
}

const JACOBI_MAX_SWEEPS: usize = 64;

/// Cyclic Jacobi eigendecomposition. Rotations are applied until the
/// off-diagonal mass is negligible relative to the total, which for the
/// T×T matrices seen here converges in a handful of sweeps.
pub fn eigh(a: &Array2<f32>) -> Eigh {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut m = a.to_owned();
    let mut v = Array2::<f32>::eye(n);

    let total: f32 = m.iter().map(|x| x * x).sum::<f32>().sqrt();
    let tol = (total * 1e-7).max(f32::MIN_POSITIVE);

    for _sweep in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0_f32;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[[p, q]] * m[[p, q]];
            }
        }
        if (2.0 * off).sqrt() <= tol {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() <= f32::MIN_POSITIVE {
                    continue;
                }
                let tau = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                // Rotate rows/columns p and q of M.
                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                // Accumulate the rotation into the eigenvector columns.
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    // Sort eigenpairs by eigenvalue, descending.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].partial_cmp(&m[[i, i]]).unwrap_or(std::cmp::Ordering::Equal));

    let values: Vec<f32> = order.iter().map(|&i| m[[i, i]]).collect();
    let mut vectors = Array2::<f32>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        for k in 0..n {
            vectors[[k, dst]] = v[[k, src]];
        }
    }

    Eigh { values, vectors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve_recovers_solution() {
        // SPD by construction: A = Bᵀ·B + I.
        let b = array![[1.0_f32, 2.0], [3.0, 1.0]];
        let a = b.t().dot(&b) + Array2::<f32>::eye(2);
        let x_true = array![[1.0_f32], [-2.0]];
        let rhs = a.dot(&x_true);

        let chol = cholesky(&a).expect("SPD");
        let x = chol.solve(&rhs);
        assert!((x[[0, 0]] - 1.0).abs() < 1e-4);
        assert!((x[[1, 0]] + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0_f32, 2.0], [2.0, 1.0]]; // eigenvalues 3, -1
        assert!(cholesky(&a).is_none());
    }

    #[test]
    fn test_cholesky_solve_multiple_rhs() {
        let a = array![[4.0_f32, 1.0], [1.0, 3.0]];
        let x_true = array![[1.0_f32, 0.0], [0.0, 2.0]];
        let rhs = a.dot(&x_true);
        let x = cholesky(&a).unwrap().solve(&rhs);
        for (got, want) in x.iter().zip(x_true.iter()) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn test_eigh_diagonal() {
        let a = array![[3.0_f32, 0.0, 0.0], [0.0, 7.0, 0.0], [0.0, 0.0, 1.0]];
        let eig = eigh(&a);
        assert!((eig.values[0] - 7.0).abs() < 1e-4);
        assert!((eig.values[1] - 3.0).abs() < 1e-4);
        assert!((eig.values[2] - 1.0).abs() < 1e-4);
        // Leading eigenvector is e₂ up to sign.
        assert!((eig.vectors[[1, 0]].abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_eigh_known_spectrum() {
        // [[2,1],[1,2]] has eigenvalues 3 and 1.
        let a = array![[2.0_f32, 1.0], [1.0, 2.0]];
        let eig = eigh(&a);
        assert!((eig.values[0] - 3.0).abs() < 1e-4);
        assert!((eig.values[1] - 1.0).abs() < 1e-4);
        // Leading eigenvector ∝ (1, 1).
        let ratio = eig.vectors[[0, 0]] / eig.vectors[[1, 0]];
        assert!((ratio - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_eigh_vectors_orthonormal() {
        let a = array![
            [4.0_f32, 1.0, 0.5, 0.0],
            [1.0, 3.0, 0.2, 0.1],
            [0.5, 0.2, 2.0, 0.3],
            [0.0, 0.1, 0.3, 1.0]
        ];
        let eig = eigh(&a);
        let gram = eig.vectors.t().dot(&eig.vectors);
        for i in 0..4 {
            for j in 0..4 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - want).abs() < 1e-4, "gram[{i},{j}]");
            }
        }
    }

    #[test]
    fn test_eigh_reconstructs_matrix() {
        let a = array![[2.0_f32, -1.0], [-1.0, 5.0]];
        let eig = eigh(&a);
        // A = V·diag(λ)·Vᵀ
        let mut lam = Array2::<f32>::zeros((2, 2));
        lam[[0, 0]] = eig.values[0];
        lam[[1, 1]] = eig.values[1];
        let rebuilt = eig.vectors.dot(&lam).dot(&eig.vectors.t());
        for (got, want) in rebuilt.iter().zip(a.iter()) {
            assert!((got - want).abs() < 1e-3);
        }
    }
}
