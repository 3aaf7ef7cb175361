//! The deep hyperalignment orchestrator — the alternating-minimization loop
//! that jointly trains one feature extractor per subject and realigns the
//! shared space they project into.
//!
//! Each outer round constructs a fresh extractor and a fresh optimizer per
//! subject (nothing is reused across rounds), fits the extractor against the
//! current shared space for a fixed number of epochs, then hands the stacked
//! projections to the alignment solver to refresh the shared space. The
//! lowest-error round is retained when best-tracking is enabled; a mean
//! residual of exactly zero is treated as a collapsed solution, never as a
//! perfect fit.

use std::time::{Duration, Instant};

use ndarray::{Array2, Array3, ArrayD, Axis, Ix3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::align::{AlignmentResult, AlignmentSolver};
use crate::dha::DhaConfig;
use crate::error::{HyperalignError, Result};
use crate::model::{Activation, Mlp};
use crate::optim::Optimizer;

/// What a completed round means for the outer loop.
#[derive(Debug, PartialEq, Eq)]
enum RoundOutcome {
    Continue,
    /// The round collapsed to zero residual but an earlier usable result
    /// exists: stop now and return that result.
    StopWithPrior,
}

/// The orchestrator. Owns the configuration and the best solution found so
/// far; all mutation of the retained state goes through one decision point
/// per round.
pub struct Dha {
    config: DhaConfig,
    shared: Option<Array2<f32>>,
    train_features: Option<Array3<f32>>,
    best_error: Option<f32>,
    error_history: Vec<f32>,
    test_features: Option<Array3<f32>>,
    train_runtime: Option<Duration>,
    test_runtime: Option<Duration>,
}

impl Dha {
    /// Validate the configuration and build an orchestrator around it.
    pub fn new(config: DhaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shared: None,
            train_features: None,
            best_error: None,
            error_history: Vec::new(),
            test_features: None,
            train_runtime: None,
            test_runtime: None,
        })
    }

    pub fn config(&self) -> &DhaConfig {
        &self.config
    }

    /// The retained shared space, if training has produced one.
    pub fn shared(&self) -> Option<&Array2<f32>> {
        self.shared.as_ref()
    }

    /// The retained per-subject training features (subject × time × feature).
    pub fn train_features(&self) -> Option<&Array3<f32>> {
        self.train_features.as_ref()
    }

    pub fn test_features(&self) -> Option<&Array3<f32>> {
        self.test_features.as_ref()
    }

    /// The retained (best or latest) mean alignment error.
    pub fn best_error(&self) -> Option<f32> {
        self.best_error
    }

    /// Mean alignment error of every completed round, in order.
    pub fn error_history(&self) -> &[f32] {
        &self.error_history
    }

    pub fn train_runtime(&self) -> Option<Duration> {
        self.train_runtime
    }

    pub fn test_runtime(&self) -> Option<Duration> {
        self.test_runtime
    }

    /// Run the alternating alignment loop over `views`
    /// (subject × time × feature). Returns the retained per-subject features
    /// and the retained shared space.
    pub fn train(&mut self, views: &ArrayD<f32>) -> Result<(Array3<f32>, Array2<f32>)> {
        let tic = Instant::now();
        let views = as_three_axes(views)?;
        let (subjects, timepoints, voxels) = views.dim();

        self.shared = None;
        self.train_features = None;
        self.best_error = None;
        self.error_history.clear();

        let features = self.resolve_features(timepoints, voxels);
        let (sizes, activations) = self.extractor_layout();

        let mut rng = self.make_rng();
        let mut shared_current: Array2<f32> =
            Array2::from_shape_fn((timepoints, features), |_| rng.sample(StandardNormal));

        for round in 0..self.config.iterations {
            let mut projected: Vec<Array2<f32>> = Vec::with_capacity(subjects);

            for subject in 0..subjects {
                let x = views.index_axis(Axis(0), subject).to_owned();
                let mut net = Mlp::new(voxels, &sizes, &activations, &mut rng);
                let mut optimizer = Optimizer::new(
                    self.config.optimizer,
                    self.config.learning_rate,
                    &net.param_shapes(),
                );

                let scale = 1.0 / timepoints as f32;
                for epoch in 0..self.config.epochs {
                    let trace = net.forward_trace(&x);
                    let output = trace.output();

                    let loss = self.config.loss.evaluate(output, &shared_current) * scale;
                    let grad = self.config.loss.grad_wrt_first(output, &shared_current) * scale;

                    let layer_grads = net.backward(&x, &trace, &grad);
                    let flat: Vec<&Array2<f32>> = layer_grads
                        .iter()
                        .flat_map(|g| [&g.weight, &g.bias])
                        .collect();
                    optimizer.step(&mut net.params_mut(), &flat);

                    tracing::trace!(
                        round = round + 1,
                        subject = subject + 1,
                        epoch = epoch + 1,
                        loss,
                        "train: update extractor"
                    );
                }

                projected.push(net.forward(&x));
            }

            let solver = AlignmentSolver::new(features, self.config.regularization);
            // The threaded path is only eligible when the alignment
            // subproblem is at least as wide as it is tall.
            let accelerated = self.config.accelerated && features >= timepoints;
            let result = solver.train(&projected, accelerated)?;

            // The next round always trains against the latest shared space;
            // best-tracking only decides what is retained for the caller.
            shared_current = result.shared.clone();

            match self.record_round(result)? {
                RoundOutcome::Continue => {
                    tracing::debug!(
                        round = round + 1,
                        error = self.error_history.last().copied().unwrap_or(f32::NAN),
                        "hyperalignment round complete"
                    );
                }
                RoundOutcome::StopWithPrior => {
                    tracing::warn!(
                        round = round + 1,
                        "alignment residual collapsed to zero; returning prior best"
                    );
                    self.train_runtime = Some(tic.elapsed());
                    return Ok(self.retained());
                }
            }
        }

        self.train_runtime = Some(tic.elapsed());
        tracing::info!(
            rounds = self.config.iterations,
            error = self.best_error,
            elapsed_ms = tic.elapsed().as_millis() as u64,
            "training complete"
        );
        Ok(self.retained())
    }

    /// Fit fresh extractors against a fixed shared space and project the
    /// given views into it. `shared_override`, when supplied, replaces the
    /// retained shared space.
    pub fn test(
        &mut self,
        views: &ArrayD<f32>,
        shared_override: Option<&Array2<f32>>,
    ) -> Result<Array3<f32>> {
        let tic = Instant::now();
        let views = as_three_axes(views)?;
        let (subjects, timepoints, voxels) = views.dim();

        self.test_features = None;

        let features = self.resolve_features(timepoints, voxels);
        let (sizes, activations) = self.extractor_layout();

        let shared = match shared_override {
            Some(s) => {
                self.shared = Some(s.clone());
                s.clone()
            }
            None => self
                .shared
                .clone()
                .ok_or(HyperalignError::MissingSharedSpace)?,
        };

        let mut rng = self.make_rng();
        let mut projected: Vec<Array2<f32>> = Vec::with_capacity(subjects);

        for subject in 0..subjects {
            let x = views.index_axis(Axis(0), subject).to_owned();
            let mut net = Mlp::new(voxels, &sizes, &activations, &mut rng);
            let mut optimizer = Optimizer::new(
                self.config.optimizer,
                self.config.learning_rate,
                &net.param_shapes(),
            );

            // One pass only: the configured outer-iteration count becomes
            // the inner gradient-step count, and the loss direction is
            // reversed (target first) for parity with the training logs.
            for step in 0..self.config.iterations {
                let trace = net.forward_trace(&x);
                let output = trace.output();

                let loss = self.config.loss.evaluate(&shared, output);
                let grad = self.config.loss.grad_wrt_second(&shared, output);

                let layer_grads = net.backward(&x, &trace, &grad);
                let flat: Vec<&Array2<f32>> = layer_grads
                    .iter()
                    .flat_map(|g| [&g.weight, &g.bias])
                    .collect();
                optimizer.step(&mut net.params_mut(), &flat);

                tracing::trace!(
                    step = step + 1,
                    subject = subject + 1,
                    loss,
                    "test: update extractor"
                );
            }

            projected.push(net.forward(&x));
        }

        let solver = AlignmentSolver::new(features, self.config.regularization);
        let accelerated = self.config.accelerated && features >= timepoints;
        let outputs = solver.test(&projected, &shared, accelerated)?;
        let features3 = stack_subjects(&outputs);

        self.test_features = Some(features3.clone());
        self.test_runtime = Some(tic.elapsed());
        tracing::info!(
            subjects,
            elapsed_ms = tic.elapsed().as_millis() as u64,
            "evaluation complete"
        );
        Ok(features3)
    }

    /// The single decision point that mutates the retained state.
    fn record_round(&mut self, result: AlignmentResult) -> Result<RoundOutcome> {
        let mean_error = result.errors.iter().sum::<f32>() / result.errors.len() as f32;

        // An exactly-zero residual means the projections collapsed below
        // the rank needed for distinct structure — unrecoverable for this
        // configuration, so no epsilon here.
        if mean_error == 0.0 {
            if self.shared.is_none() {
                return Err(HyperalignError::DegenerateSolution);
            }
            return Ok(RoundOutcome::StopWithPrior);
        }

        let keep = if self.config.track_best {
            // Tie favours the newer result.
            self.best_error.map_or(true, |best| mean_error <= best)
        } else {
            true
        };
        if keep {
            self.shared = Some(result.shared);
            self.train_features = Some(stack_subjects(&result.outputs));
            self.best_error = Some(mean_error);
        }

        self.error_history.push(mean_error);
        Ok(RoundOutcome::Continue)
    }

    /// Shared-space width: configured, or derived as min(T, V) on first use
    /// and frozen into the configuration from then on.
    fn resolve_features(&mut self, timepoints: usize, voxels: usize) -> usize {
        let slot = self
            .config
            .layer_sizes
            .last_mut()
            .expect("validated: at least one layer");
        match *slot {
            Some(f) => f,
            None => {
                let f = timepoints.min(voxels);
                *slot = Some(f);
                tracing::info!(features = f, "shared dimensionality auto-derived");
                f
            }
        }
    }

    /// Concrete layer widths + activations after feature resolution.
    fn extractor_layout(&self) -> (Vec<usize>, Vec<Activation>) {
        let sizes = self
            .config
            .layer_sizes
            .iter()
            .map(|s| s.expect("resolved before use"))
            .collect();
        (sizes, self.config.activations.clone())
    }

    fn make_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn retained(&self) -> (Array3<f32>, Array2<f32>) {
        (
            self.train_features
                .clone()
                .expect("a non-degenerate round was retained"),
            self.shared.clone().expect("a non-degenerate round was retained"),
        )
    }
}

fn as_three_axes(views: &ArrayD<f32>) -> Result<ndarray::ArrayView3<'_, f32>> {
    if views.ndim() != 3 {
        return Err(HyperalignError::InputShape(views.ndim()));
    }
    Ok(views
        .view()
        .into_dimensionality::<Ix3>()
        .expect("dimensionality checked"))
}

fn stack_subjects(outputs: &[Array2<f32>]) -> Array3<f32> {
    let views: Vec<_> = outputs.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).expect("per-subject outputs share one shape")
}
