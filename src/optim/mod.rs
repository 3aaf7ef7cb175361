//! Gradient-descent optimizers for the feature extractor.
//!
//! A fresh optimizer is bound to a fresh network every (subject, round)
//! pair; no state survives a round. Parameters and gradients are passed as
//! flat slices in the network's enumeration order, so the optimizer never
//! needs to know the layer structure.

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::HyperalignError;

/// Closed set of supported optimizers, resolved once at configuration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = HyperalignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            other => Err(HyperalignError::UnsupportedOptimizer(other.to_string())),
        }
    }
}

/// Plain SGD: `p -= lr · g`. No momentum — the alternating loop binds a
/// fresh optimizer every round, so momentum would never have time to help.
#[derive(Clone, Debug)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn step(&mut self, params: &mut [&mut Array2<f32>], grads: &[&Array2<f32>]) {
        debug_assert_eq!(params.len(), grads.len());
        for (param, grad) in params.iter_mut().zip(grads.iter()) {
            **param = &**param - &(*grad * self.learning_rate);
        }
    }
}

/// Adam with the standard defaults (β₁=0.9, β₂=0.999, ε=1e-8) and bias
/// correction.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step_count: u64,
    first_moment: Vec<Array2<f32>>,
    second_moment: Vec<Array2<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f32, param_shapes: &[(usize, usize)]) -> Self {
        let zeros = |shapes: &[(usize, usize)]| -> Vec<Array2<f32>> {
            shapes.iter().map(|&(r, c)| Array2::zeros((r, c))).collect()
        };
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step_count: 0,
            first_moment: zeros(param_shapes),
            second_moment: zeros(param_shapes),
        }
    }

    pub fn step(&mut self, params: &mut [&mut Array2<f32>], grads: &[&Array2<f32>]) {
        debug_assert_eq!(params.len(), grads.len());
        debug_assert_eq!(params.len(), self.first_moment.len());

        self.step_count += 1;
        let t = self.step_count as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (i, (param, grad)) in params.iter_mut().zip(grads.iter()).enumerate() {
            self.first_moment[i] =
                &self.first_moment[i] * self.beta1 + &(*grad * (1.0 - self.beta1));
            self.second_moment[i] = &self.second_moment[i] * self.beta2
                + &grad.mapv(|g| g * g * (1.0 - self.beta2));

            let m_hat = &self.first_moment[i] / bias1;
            let v_hat = &self.second_moment[i] / bias2;
            let update = m_hat / (v_hat.mapv(f32::sqrt) + self.epsilon) * self.learning_rate;
            **param = &**param - &update;
        }
    }
}

/// Kind-dispatched optimizer, constructed per (subject, round) pair.
pub enum Optimizer {
    Sgd(Sgd),
    Adam(Adam),
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f32, param_shapes: &[(usize, usize)]) -> Self {
        match kind {
            OptimizerKind::Sgd => Optimizer::Sgd(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Optimizer::Adam(Adam::new(learning_rate, param_shapes)),
        }
    }

    /// Apply one update. `params` and `grads` must be in the same
    /// enumeration order with matching shapes.
    pub fn step(&mut self, params: &mut [&mut Array2<f32>], grads: &[&Array2<f32>]) {
        match self {
            Optimizer::Sgd(inner) => inner.step(params, grads),
            Optimizer::Adam(inner) => inner.step(params, grads),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert!(matches!(
            "rmsprop".parse::<OptimizerKind>(),
            Err(HyperalignError::UnsupportedOptimizer(_))
        ));
    }

    #[test]
    fn test_sgd_step() {
        let mut param = array![[1.0_f32, 2.0]];
        let grad = array![[0.5_f32, -1.0]];
        let mut sgd = Sgd::new(0.1);
        sgd.step(&mut [&mut param], &[&grad]);
        assert!((param[[0, 0]] - 0.95).abs() < 1e-6);
        assert!((param[[0, 1]] - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_adam_first_step_is_signed_lr() {
        // With bias correction, the first Adam step is ≈ lr · sign(g).
        let mut param = array![[0.0_f32, 0.0]];
        let grad = array![[3.0_f32, -0.2]];
        let mut adam = Adam::new(0.01, &[(1, 2)]);
        adam.step(&mut [&mut param], &[&grad]);
        assert!((param[[0, 0]] + 0.01).abs() < 1e-4);
        assert!((param[[0, 1]] - 0.01).abs() < 1e-4);
    }

    #[test]
    fn test_adam_zero_gradient_is_noop() {
        let mut param = array![[1.5_f32]];
        let grad = array![[0.0_f32]];
        let mut adam = Adam::new(0.1, &[(1, 1)]);
        adam.step(&mut [&mut param], &[&grad]);
        assert!((param[[0, 0]] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_dispatch_matches_inner() {
        let mut a = array![[1.0_f32]];
        let mut b = array![[1.0_f32]];
        let grad = array![[2.0_f32]];
        Sgd::new(0.5).step(&mut [&mut a], &[&grad]);
        Optimizer::new(OptimizerKind::Sgd, 0.5, &[(1, 1)]).step(&mut [&mut b], &[&grad]);
        assert_eq!(a, b);
    }
}
