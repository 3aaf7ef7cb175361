//! Orchestrator configuration and eager validation.

use serde::{Deserialize, Serialize};

use crate::error::{HyperalignError, Result};
use crate::loss::LossKind;
use crate::model::Activation;
use crate::optim::OptimizerKind;

/// Configuration for the alternating alignment loop.
///
/// `layer_sizes` are the extractor's layer widths; the last entry is the
/// shared-space dimensionality and may be left unset, in which case it is
/// derived as `min(timepoints, raw features)` from the first training call
/// and frozen in place for the lifetime of the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DhaConfig {
    pub layer_sizes: Vec<Option<usize>>,
    /// One activation per layer, or a single activation applied uniformly.
    pub activations: Vec<Activation>,
    pub loss: LossKind,
    pub optimizer: OptimizerKind,
    /// Outer alternating rounds during training; reused as the inner
    /// gradient-step count during evaluation.
    pub iterations: usize,
    /// Inner gradient steps per subject per training round.
    pub epochs: usize,
    pub learning_rate: f32,
    /// Ridge strength for the alignment sub-solver.
    pub regularization: f32,
    /// Retain the lowest-error round instead of the latest one.
    pub track_best: bool,
    /// Allow the threaded alignment path where the subproblem is eligible.
    pub accelerated: bool,
    /// Seed for shared-space init and extractor weights; `None` draws from
    /// entropy.
    pub seed: Option<u64>,
}

impl Default for DhaConfig {
    fn default() -> Self {
        Self {
            layer_sizes: vec![None],
            activations: vec![Activation::Linear],
            loss: LossKind::Mse,
            optimizer: OptimizerKind::Sgd,
            iterations: 10,
            epochs: 10,
            learning_rate: 0.1,
            regularization: 1e-4,
            track_best: true,
            accelerated: true,
            seed: None,
        }
    }
}

impl DhaConfig {
    /// Check every constructor-time contract. Loss and optimizer kinds are
    /// closed enums here, so the unsupported-kind cases are caught where
    /// strings enter the system (`FromStr`), not re-checked per call.
    pub fn validate(&self) -> Result<()> {
        if self.layer_sizes.is_empty() {
            return Err(HyperalignError::Config(
                "model must have at least one layer".into(),
            ));
        }
        if self.activations.is_empty() {
            return Err(HyperalignError::Config(
                "at least one activation function is required".into(),
            ));
        }
        if self.activations.len() != 1 && self.activations.len() != self.layer_sizes.len() {
            return Err(HyperalignError::Config(format!(
                "{} activations do not match {} layers (use one, or one per layer)",
                self.activations.len(),
                self.layer_sizes.len()
            )));
        }
        for (i, size) in self.layer_sizes.iter().enumerate() {
            let last = i + 1 == self.layer_sizes.len();
            match size {
                Some(0) => {
                    return Err(HyperalignError::Config(format!(
                        "layer {i} has zero width"
                    )));
                }
                None if !last => {
                    return Err(HyperalignError::Config(format!(
                        "layer {i} has no width; only the final (shared-space) layer may be unset"
                    )));
                }
                _ => {}
            }
        }
        if self.iterations == 0 {
            return Err(HyperalignError::Config(
                "iteration count must be greater than 0".into(),
            ));
        }
        if self.epochs == 0 {
            return Err(HyperalignError::Config(
                "epoch count must be greater than 0".into(),
            ));
        }
        if !(self.regularization > 0.0) {
            return Err(HyperalignError::Config(
                "regularization must be greater than 0".into(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(HyperalignError::Config(
                "learning rate must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DhaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_layers_rejected() {
        let cfg = DhaConfig {
            layer_sizes: vec![],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_activations_rejected() {
        let cfg = DhaConfig {
            activations: vec![],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_activation_length_mismatch_rejected() {
        let cfg = DhaConfig {
            layer_sizes: vec![Some(8), Some(4), None],
            activations: vec![Activation::Tanh, Activation::Relu],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_per_layer_activations_accepted() {
        let cfg = DhaConfig {
            layer_sizes: vec![Some(8), None],
            activations: vec![Activation::Tanh, Activation::Linear],
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unset_hidden_layer_rejected() {
        let cfg = DhaConfig {
            layer_sizes: vec![None, Some(4)],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_nonpositive_counts_rejected() {
        for cfg in [
            DhaConfig {
                iterations: 0,
                ..Default::default()
            },
            DhaConfig {
                epochs: 0,
                ..Default::default()
            },
        ] {
            assert!(cfg.validate().is_err());
        }
    }

    #[test]
    fn test_nonpositive_scalars_rejected() {
        for cfg in [
            DhaConfig {
                learning_rate: 0.0,
                ..Default::default()
            },
            DhaConfig {
                learning_rate: -0.1,
                ..Default::default()
            },
            DhaConfig {
                learning_rate: f32::NAN,
                ..Default::default()
            },
            DhaConfig {
                regularization: 0.0,
                ..Default::default()
            },
            DhaConfig {
                regularization: -1e-4,
                ..Default::default()
            },
        ] {
            assert!(cfg.validate().is_err());
        }
    }

    #[test]
    fn test_zero_width_layer_rejected() {
        let cfg = DhaConfig {
            layer_sizes: vec![Some(0)],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
