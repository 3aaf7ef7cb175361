//! Regularized hyperalignment over already-projected views.
//!
//! Given K subjects' projected matrices Xᵢ (T×F), the solver finds a shared
//! basis G (T×dim, orthonormal columns) minimizing the total regularized
//! reconstruction residual Σᵢ ‖G − XᵢWᵢ‖²F. With ridge mappings
//! Wᵢ = (XᵢᵀXᵢ + αI)⁻¹XᵢᵀG, each subject's reconstruction is a fixed
//! projector applied to G:
//!
//!   Yᵢ = Pᵢ·G,   Pᵢ = Xᵢ(XᵢᵀXᵢ + αI)⁻¹Xᵢᵀ = (Mᵢ + αI)⁻¹Mᵢ,  Mᵢ = XᵢXᵢᵀ
//!
//! (push-through identity — all solves stay T×T no matter how wide the raw
//! feature axis is), and the optimal G is the top-`dim` eigenbasis of ΣᵢPᵢ.

use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::align::linalg::{cholesky, eigh};
use crate::error::{HyperalignError, Result};

/// One alignment solve: the shared basis, per-subject reconstructions, and
/// per-subject residual errors.
pub struct AlignmentResult {
    /// Shared basis G, (T × dim) with orthonormal columns.
    pub shared: Array2<f32>,
    /// Per-subject reconstructions Yᵢ = Pᵢ·G, each (T × dim).
    pub outputs: Vec<Array2<f32>>,
    /// Per-subject residuals ‖G − Yᵢ‖²F.
    pub errors: Vec<f32>,
}

/// The alignment sub-solver, constructed per round with the target
/// dimensionality and ridge strength.
pub struct AlignmentSolver {
    dim: usize,
    regularization: f32,
}

impl AlignmentSolver {
    pub fn new(dim: usize, regularization: f32) -> Self {
        Self {
            dim,
            regularization,
        }
    }

    /// Compute a fresh shared basis from the given views.
    ///
    /// `accelerated` is an explicit capability flag: when set, the
    /// per-subject projector solves run on the rayon pool; otherwise they
    /// run sequentially. The results are identical either way.
    pub fn train(&self, views: &[Array2<f32>], accelerated: bool) -> Result<AlignmentResult> {
        let timepoints = self.check_views(views)?;
        if self.dim > timepoints {
            return Err(HyperalignError::Config(format!(
                "shared dimensionality {} exceeds the {} timepoints available for alignment",
                self.dim, timepoints
            )));
        }

        let projectors = self.projectors(views, accelerated)?;

        let mut summed = Array2::<f32>::zeros((timepoints, timepoints));
        for p in &projectors {
            summed += p;
        }

        let eig = eigh(&summed);
        let shared = eig.vectors.slice(s![.., ..self.dim]).to_owned();

        let mut outputs = Vec::with_capacity(projectors.len());
        let mut errors = Vec::with_capacity(projectors.len());
        for p in &projectors {
            let y = p.dot(&shared);
            let residual = (&shared - &y).mapv(|d| d * d).sum();
            outputs.push(y);
            errors.push(residual);
        }

        Ok(AlignmentResult {
            shared,
            outputs,
            errors,
        })
    }

    /// Project new views onto a previously fixed shared basis, without
    /// modifying it.
    pub fn test(
        &self,
        views: &[Array2<f32>],
        shared: &Array2<f32>,
        accelerated: bool,
    ) -> Result<Vec<Array2<f32>>> {
        let timepoints = self.check_views(views)?;
        if shared.nrows() != timepoints {
            return Err(HyperalignError::Config(format!(
                "shared space has {} timepoints but views have {}",
                shared.nrows(),
                timepoints
            )));
        }

        let projectors = self.projectors(views, accelerated)?;
        Ok(projectors.iter().map(|p| p.dot(shared)).collect())
    }

    fn check_views(&self, views: &[Array2<f32>]) -> Result<usize> {
        let first = views
            .first()
            .ok_or_else(|| HyperalignError::Config("alignment needs at least one view".into()))?;
        let (timepoints, features) = first.dim();
        for v in views {
            if v.dim() != (timepoints, features) {
                return Err(HyperalignError::Config(format!(
                    "all views must share one shape: expected {:?}, got {:?}",
                    (timepoints, features),
                    v.dim()
                )));
            }
        }
        Ok(timepoints)
    }

    fn projectors(&self, views: &[Array2<f32>], accelerated: bool) -> Result<Vec<Array2<f32>>> {
        let alpha = self.regularization;
        if accelerated {
            views.par_iter().map(|v| projector(v, alpha)).collect()
        } else {
            views.iter().map(|v| projector(v, alpha)).collect()
        }
    }
}

/// The ridge projector Pᵢ = (M + αI)⁻¹M with M = X·Xᵀ, symmetrized against
/// solve round-off.
fn projector(view: &Array2<f32>, alpha: f32) -> Result<Array2<f32>> {
    let t = view.nrows();
    let m = view.dot(&view.t());
    let mut regularized = m.clone();
    for i in 0..t {
        regularized[[i, i]] += alpha;
    }
    let chol = cholesky(&regularized).ok_or_else(|| {
        HyperalignError::Config(
            "alignment normal equations are not positive definite; increase regularization".into(),
        )
    })?;
    let p = chol.solve(&m);
    Ok((&p + &p.t()) * 0.5)
}
