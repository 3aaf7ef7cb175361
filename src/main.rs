//! hyperalign — deep hyperalignment of multi-subject time series.
//!
//! CLI demo binary: generates synthetic views, runs the alternating
//! alignment loop, evaluates held-out subjects against the learned shared
//! space, and reports alignment quality.

use anyhow::Context;
use clap::Parser;
use ndarray::{Array3, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hyperalign::{Activation, Dha, DhaConfig, LossKind, OptimizerKind};

/// Deep hyperalignment demo CLI.
#[derive(Parser, Debug)]
#[command(
    name = "hyperalign",
    about = "hyperalign — align multi-subject time series into a shared space",
    version
)]
struct Cli {
    /// Number of training subjects.
    #[arg(long, default_value_t = 10)]
    subjects: usize,

    /// Number of held-out subjects for evaluation.
    #[arg(long, default_value_t = 2)]
    test_subjects: usize,

    /// Timepoints per subject.
    #[arg(long, default_value_t = 10)]
    timepoints: usize,

    /// Raw features (voxels) per timepoint.
    #[arg(long, default_value_t = 100)]
    voxels: usize,

    /// Shared-space width; derived as min(timepoints, voxels) when omitted.
    #[arg(long)]
    features: Option<usize>,

    /// Hidden layer widths for the per-subject extractor.
    #[arg(long, value_delimiter = ',')]
    hidden: Vec<usize>,

    /// Activation kind(s): one, or one per layer (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "linear")]
    activation: Vec<String>,

    /// Loss kind: mse, soft, mean, or norm.
    #[arg(long, default_value = "mse")]
    loss: String,

    /// Optimizer kind: adam or sgd.
    #[arg(long, default_value = "sgd")]
    optimizer: String,

    /// Outer alignment rounds (also the inner step count at evaluation).
    #[arg(short = 'n', long, default_value_t = 10)]
    iterations: usize,

    /// Gradient steps per subject per round.
    #[arg(long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 0.1)]
    learning_rate: f32,

    #[arg(long, default_value_t = 1e-4)]
    regularization: f32,

    /// Keep the latest round instead of the best one.
    #[arg(long, default_value_t = false)]
    latest: bool,

    /// Force the sequential alignment path.
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// RNG seed for data and weights.
    #[arg(long, default_value_t = 13)]
    seed: u64,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("hyperalign v{}", env!("CARGO_PKG_VERSION"));

    let loss: LossKind = cli.loss.parse()?;
    let optimizer: OptimizerKind = cli.optimizer.parse()?;
    let activations = cli
        .activation
        .iter()
        .map(|a| a.parse::<Activation>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut layer_sizes: Vec<Option<usize>> = cli.hidden.iter().map(|&h| Some(h)).collect();
    layer_sizes.push(cli.features);

    let config = DhaConfig {
        layer_sizes,
        activations,
        loss,
        optimizer,
        iterations: cli.iterations,
        epochs: cli.epochs,
        learning_rate: cli.learning_rate,
        regularization: cli.regularization,
        track_best: !cli.latest,
        accelerated: !cli.sequential,
        seed: Some(cli.seed),
    };
    tracing::info!(
        "Config: loss={}, optimizer={}, rounds={}, epochs={}, lr={}",
        config.loss,
        config.optimizer,
        config.iterations,
        config.epochs,
        config.learning_rate,
    );

    let mut dha = Dha::new(config)?;

    let mut rng = StdRng::seed_from_u64(cli.seed ^ 0x5EED);
    let train_views = random_views(cli.subjects, cli.timepoints, cli.voxels, &mut rng);
    let test_views = random_views(cli.test_subjects, cli.timepoints, cli.voxels, &mut rng);

    let (train_features, shared) = dha.train(&train_views)?;
    let test_features = dha.test(&test_views, None)?;

    // Shared-space diagnostics: tr(G) and tr(GᵀG)/T (≈ F/T for an
    // orthonormal basis).
    let trace_g: f32 = (0..shared.nrows().min(shared.ncols()))
        .map(|i| shared[[i, i]])
        .sum();
    let gram_trace: f32 = shared.t().dot(&shared).diag().sum();

    tracing::info!("Shared space: {:?}", shared.dim());
    tracing::info!("Train features: {:?}", train_features.dim());
    tracing::info!("Test features: {:?}", test_features.dim());
    tracing::info!(
        "tr(G) = {:.4}, tr(GᵀG)/T = {:.4}",
        trace_g,
        gram_trace / shared.nrows() as f32,
    );
    tracing::info!("Round errors: {:?}", dha.error_history());
    tracing::info!(
        "Best error: {:.4}, train {:.1} ms, test {:.1} ms",
        dha.best_error().unwrap_or(f32::NAN),
        dha.train_runtime().map_or(0.0, |d| d.as_secs_f64() * 1e3),
        dha.test_runtime().map_or(0.0, |d| d.as_secs_f64() * 1e3),
    );

    // Held-out alignment quality: Σᵢ ‖G − Yᵢ‖²F over test subjects.
    let mut test_error = 0.0_f32;
    for subject in test_features.outer_iter() {
        test_error += (&shared - &subject).mapv(|d| d * d).sum();
    }
    tracing::info!("Test error: {:.4}", test_error);

    if let Some(path) = &cli.report {
        let report = serde_json::json!({
            "config": dha.config(),
            "shared_shape": shared.dim(),
            "train_features_shape": train_features.dim(),
            "test_features_shape": test_features.dim(),
            "error_history": dha.error_history(),
            "best_error": dha.best_error(),
            "test_error": test_error,
            "train_ms": dha.train_runtime().map(|d| d.as_secs_f64() * 1e3),
            "test_ms": dha.test_runtime().map(|d| d.as_secs_f64() * 1e3),
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report to {path}"))?;
        tracing::info!("Report written to {path}");
    }

    tracing::info!("Done.");
    Ok(())
}

fn random_views(subjects: usize, timepoints: usize, voxels: usize, rng: &mut StdRng) -> ArrayD<f32> {
    Array3::from_shape_fn((subjects, timepoints, voxels), |_| rng.gen::<f32>()).into_dyn()
}
