//! Loss dispatch table for the extractor training steps.
//!
//! The kind is a closed enum resolved once when the orchestrator is
//! configured, never re-parsed inside the inner loop. Every kind exposes its
//! value and its gradient with respect to either argument, because the
//! training pass evaluates `(output, target)` while the evaluation pass
//! evaluates `(target, output)` — the argument order is preserved for
//! log parity even where the two directions agree numerically.

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::HyperalignError;
use crate::model::sigmoid;

/// Closed set of supported loss kinds.
///
/// `Mse` and `Soft` treat their arguments as (prediction, target) in the
/// usual criterion sense; `Mean` and `Norm` are applied to the elementwise
/// difference `first − second`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Elementwise squared error, averaged over all entries.
    Mse,
    /// Multi-label soft-margin loss.
    Soft,
    /// Arithmetic mean of the difference tensor.
    Mean,
    /// Frobenius norm of the difference tensor.
    Norm,
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossKind::Mse => write!(f, "mse"),
            LossKind::Soft => write!(f, "soft"),
            LossKind::Mean => write!(f, "mean"),
            LossKind::Norm => write!(f, "norm"),
        }
    }
}

impl FromStr for LossKind {
    type Err = HyperalignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(LossKind::Mse),
            "soft" => Ok(LossKind::Soft),
            "mean" => Ok(LossKind::Mean),
            "norm" => Ok(LossKind::Norm),
            other => Err(HyperalignError::UnsupportedLoss(other.to_string())),
        }
    }
}

impl LossKind {
    /// Loss value with arguments in the given order.
    pub fn evaluate(&self, first: &Array2<f32>, second: &Array2<f32>) -> f32 {
        debug_assert_eq!(first.dim(), second.dim());
        let n = first.len() as f32;
        match self {
            LossKind::Mse => {
                let diff = first - second;
                diff.mapv(|d| d * d).sum() / n
            }
            LossKind::Soft => {
                // -1/(T·C) Σ [ t·log σ(x) + (1−t)·log(1−σ(x)) ]
                // with x = first (logits), t = second (targets).
                let mut acc = 0.0_f32;
                for (&x, &t) in first.iter().zip(second.iter()) {
                    let s = sigmoid(x).clamp(1e-12, 1.0 - 1e-12);
                    acc += t * s.ln() + (1.0 - t) * (1.0 - s).ln();
                }
                -acc / n
            }
            LossKind::Mean => (first - second).sum() / n,
            LossKind::Norm => (first - second).mapv(|d| d * d).sum().sqrt(),
        }
    }

    /// Gradient of [`LossKind::evaluate`] with respect to the first argument.
    pub fn grad_wrt_first(&self, first: &Array2<f32>, second: &Array2<f32>) -> Array2<f32> {
        debug_assert_eq!(first.dim(), second.dim());
        let n = first.len() as f32;
        match self {
            LossKind::Mse => (first - second) * (2.0 / n),
            LossKind::Soft => {
                let mut grad = first.to_owned();
                grad.zip_mut_with(second, |x, &t| *x = (sigmoid(*x) - t) / n);
                grad
            }
            LossKind::Mean => Array2::from_elem(first.dim(), 1.0 / n),
            LossKind::Norm => {
                let diff = first - second;
                let norm = diff.mapv(|d| d * d).sum().sqrt();
                if norm == 0.0 {
                    Array2::zeros(first.dim())
                } else {
                    diff / norm
                }
            }
        }
    }

    /// Gradient of [`LossKind::evaluate`] with respect to the second
    /// argument. Used by the evaluation pass, where the trained output sits
    /// in the second slot.
    pub fn grad_wrt_second(&self, first: &Array2<f32>, second: &Array2<f32>) -> Array2<f32> {
        debug_assert_eq!(first.dim(), second.dim());
        let n = first.len() as f32;
        match self {
            LossKind::Mse => (second - first) * (2.0 / n),
            // d/dt of −[t·log σ(x) + (1−t)·log(1−σ(x))] reduces to −x
            // because log σ(x) − log(1−σ(x)) = x.
            LossKind::Soft => first.mapv(|x| -x / n),
            LossKind::Mean => Array2::from_elem(first.dim(), -1.0 / n),
            LossKind::Norm => {
                let diff = first - second;
                let norm = diff.mapv(|d| d * d).sum().sqrt();
                if norm == 0.0 {
                    Array2::zeros(first.dim())
                } else {
                    diff.mapv(|d| -d) / norm
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("MSE".parse::<LossKind>().unwrap(), LossKind::Mse);
        assert_eq!("norm".parse::<LossKind>().unwrap(), LossKind::Norm);
        assert!(matches!(
            "huber".parse::<LossKind>(),
            Err(HyperalignError::UnsupportedLoss(_))
        ));
    }

    #[test]
    fn test_mse_value_and_gradient() {
        let a = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let b = array![[0.0_f32, 2.0], [3.0, 2.0]];
        // diffs: 1, 0, 0, 2 → mean of squares = 5/4
        assert!((LossKind::Mse.evaluate(&a, &b) - 1.25).abs() < 1e-6);
        let g = LossKind::Mse.grad_wrt_first(&a, &b);
        assert!((g[[0, 0]] - 0.5).abs() < 1e-6);
        assert!((g[[1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_direction_symmetry() {
        // The reversed evaluation direction must be numerically identical.
        let a = array![[0.2_f32, -1.0], [0.7, 0.1]];
        let b = array![[1.0_f32, 0.5], [-0.3, 0.0]];
        let fwd = LossKind::Mse.evaluate(&a, &b);
        let rev = LossKind::Mse.evaluate(&b, &a);
        assert!((fwd - rev).abs() < 1e-6);

        let g_fwd = LossKind::Mse.grad_wrt_first(&a, &b);
        let g_rev = LossKind::Mse.grad_wrt_second(&b, &a);
        for (x, y) in g_fwd.iter().zip(g_rev.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_norm_direction_symmetry() {
        let a = array![[0.5_f32, 2.0]];
        let b = array![[1.5_f32, 0.0]];
        assert!((LossKind::Norm.evaluate(&a, &b) - LossKind::Norm.evaluate(&b, &a)).abs() < 1e-6);
        let g_fwd = LossKind::Norm.grad_wrt_first(&a, &b);
        let g_rev = LossKind::Norm.grad_wrt_second(&b, &a);
        for (x, y) in g_fwd.iter().zip(g_rev.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mean_gradients_are_constant() {
        let a = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let b = array![[4.0_f32, 3.0], [2.0, 1.0]];
        assert!((LossKind::Mean.evaluate(&a, &b) - 0.0).abs() < 1e-6);
        let g1 = LossKind::Mean.grad_wrt_first(&a, &b);
        let g2 = LossKind::Mean.grad_wrt_second(&a, &b);
        assert!(g1.iter().all(|&v| (v - 0.25).abs() < 1e-6));
        assert!(g2.iter().all(|&v| (v + 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_norm_zero_difference_has_zero_gradient() {
        let a = array![[1.0_f32, 2.0]];
        let g = LossKind::Norm.grad_wrt_first(&a, &a);
        assert!(g.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_soft_at_zero_logits() {
        // σ(0) = 0.5 everywhere → value is ln 2 regardless of targets in
        // [0, 1], and the prediction gradient is (0.5 − t)/n.
        let logits = array![[0.0_f32, 0.0]];
        let targets = array![[1.0_f32, 0.0]];
        let v = LossKind::Soft.evaluate(&logits, &targets);
        assert!((v - std::f32::consts::LN_2).abs() < 1e-5);

        let g = LossKind::Soft.grad_wrt_first(&logits, &targets);
        assert!((g[[0, 0]] + 0.25).abs() < 1e-6);
        assert!((g[[0, 1]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_soft_target_gradient_is_scaled_logits() {
        let logits = array![[2.0_f32, -4.0]];
        let targets = array![[0.3_f32, 0.6]];
        let g = LossKind::Soft.grad_wrt_second(&logits, &targets);
        assert!((g[[0, 0]] + 1.0).abs() < 1e-6);
        assert!((g[[0, 1]] - 2.0).abs() < 1e-6);
    }
}
