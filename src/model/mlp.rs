//! Per-subject feature extractor: a plain feed-forward network over
//! full-batch `ndarray` matrices.
//!
//! One instance is constructed per (subject, round) pair, trained for a few
//! steps, asked for its final projection, and dropped — nothing here is
//! persisted across rounds. Gradients are computed by a cached forward trace
//! plus a reverse pass; there is no autograd tape.

use ndarray::{Array2, Axis};
use rand::distributions::Uniform;
use rand::Rng;

use crate::model::Activation;

/// A single dense layer: `out = act(in · W + b)`.
///
/// `weight` is (fan_in, fan_out); `bias` is kept as (1, fan_out) so it
/// broadcasts over the time axis and shares the optimizer's matrix slot
/// layout.
#[derive(Clone, Debug)]
pub struct DenseLayer {
    pub weight: Array2<f32>,
    pub bias: Array2<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    /// PyTorch-style init: weight and bias ~ U(-1/√fan_in, 1/√fan_in).
    pub fn init<R: Rng + ?Sized>(
        fan_in: usize,
        fan_out: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (fan_in as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::from_shape_fn((fan_in, fan_out), |_| rng.sample(dist));
        let bias = Array2::from_shape_fn((1, fan_out), |_| rng.sample(dist));
        Self {
            weight,
            bias,
            activation,
        }
    }
}

/// Gradients for one layer, same shapes as the parameters.
#[derive(Clone, Debug)]
pub struct LayerGrads {
    pub weight: Array2<f32>,
    pub bias: Array2<f32>,
}

/// Cached pre- and post-activation values from a forward pass, consumed by
/// the backward pass.
pub struct ForwardTrace {
    /// Pre-activation `z_l = a_{l-1} · W_l + b_l`, one per layer.
    pre: Vec<Array2<f32>>,
    /// Post-activation `a_l = act(z_l)`, one per layer.
    post: Vec<Array2<f32>>,
}

impl ForwardTrace {
    /// The network output (last post-activation).
    pub fn output(&self) -> &Array2<f32> {
        self.post.last().expect("trace from a non-empty network")
    }
}

/// The feature extractor: input (T, V) → candidate shared-space projection
/// (T, F).
pub struct Mlp {
    layers: Vec<DenseLayer>,
}

impl Mlp {
    /// Build a fresh network. `sizes` are the layer output widths (the last
    /// one is the shared-space width); `activations` has either one entry
    /// applied uniformly or one per layer. Length mismatches are a caller
    /// bug — the orchestrator validates its configuration before this point.
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        sizes: &[usize],
        activations: &[Activation],
        rng: &mut R,
    ) -> Self {
        debug_assert!(!sizes.is_empty());
        debug_assert!(activations.len() == 1 || activations.len() == sizes.len());

        let mut layers = Vec::with_capacity(sizes.len());
        let mut fan_in = input_dim;
        for (i, &fan_out) in sizes.iter().enumerate() {
            let act = if activations.len() == 1 {
                activations[0]
            } else {
                activations[i]
            };
            layers.push(DenseLayer::init(fan_in, fan_out, act, rng));
            fan_in = fan_out;
        }
        Self { layers }
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.weight.ncols()).unwrap_or(0)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Enumerable trainable parameters, layer by layer (weight then bias),
    /// for optimizer binding.
    pub fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        let mut out = Vec::with_capacity(self.layers.len() * 2);
        for layer in &mut self.layers {
            out.push(&mut layer.weight);
            out.push(&mut layer.bias);
        }
        out
    }

    /// Parameter shapes in the same order as [`Mlp::params_mut`].
    pub fn param_shapes(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.layers.len() * 2);
        for layer in &self.layers {
            out.push(layer.weight.dim());
            out.push(layer.bias.dim());
        }
        out
    }

    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weight.len() + l.bias.len())
            .sum()
    }

    /// Plain forward pass.
    pub fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        let mut a = input.to_owned();
        for layer in &self.layers {
            let z = a.dot(&layer.weight) + &layer.bias;
            a = z.mapv(|v| layer.activation.apply(v));
        }
        a
    }

    /// Forward pass that keeps the intermediate values needed for
    /// [`Mlp::backward`].
    pub fn forward_trace(&self, input: &Array2<f32>) -> ForwardTrace {
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut post = Vec::with_capacity(self.layers.len());
        let mut a = input.to_owned();
        for layer in &self.layers {
            let z = a.dot(&layer.weight) + &layer.bias;
            a = z.mapv(|v| layer.activation.apply(v));
            pre.push(z);
            post.push(a.clone());
        }
        ForwardTrace { pre, post }
    }

    /// Reverse pass: given dL/d(output), produce per-layer parameter
    /// gradients in layer order.
    pub fn backward(
        &self,
        input: &Array2<f32>,
        trace: &ForwardTrace,
        grad_output: &Array2<f32>,
    ) -> Vec<LayerGrads> {
        let n = self.layers.len();
        let mut grads: Vec<Option<LayerGrads>> = (0..n).map(|_| None).collect();
        let mut d_act = grad_output.to_owned();

        for l in (0..n).rev() {
            let layer = &self.layers[l];
            // dZ = dA ⊙ act'(z)
            let dz = &d_act * &trace.pre[l].mapv(|v| layer.activation.derivative(v));

            let below: &Array2<f32> = if l == 0 { input } else { &trace.post[l - 1] };
            let d_weight = below.t().dot(&dz);
            let d_bias = dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            d_act = dz.dot(&layer.weight.t());
            grads[l] = Some(LayerGrads {
                weight: d_weight,
                bias: d_bias,
            });
        }

        grads.into_iter().map(|g| g.expect("every layer visited")).collect()
    }
}
