//! Error taxonomy for the hyperalignment pipeline.
//!
//! Configuration problems are caught eagerly at construction time and never
//! retried. Shape problems are caught at the start of `train`/`test`. The
//! degenerate-solution case is the one runtime failure the alternating loop
//! can produce on its own.

use thiserror::Error;

/// All failures the crate can surface.
#[derive(Debug, Error)]
pub enum HyperalignError {
    /// Bad constructor arguments — checked eagerly, never retried.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed `views` input; the only accepted layout is
    /// (subject, time, feature).
    #[error("views must be 3-dimensional (subject x time x feature), got {0} axes")]
    InputShape(usize),

    /// Loss kind outside {mse, soft, mean, norm}. Unreachable after
    /// construction-time validation; surfaced when parsing external input.
    #[error("unsupported loss kind {0:?} (options: mse, soft, mean, norm)")]
    UnsupportedLoss(String),

    /// Optimizer kind outside {adam, sgd}.
    #[error("unsupported optimizer kind {0:?} (options: adam, sgd)")]
    UnsupportedOptimizer(String),

    /// Mean alignment residual reached exactly zero with no prior usable
    /// result: the projected features collapsed to a space with too little
    /// rank to carry distinct structure.
    #[error(
        "alignment residual collapsed to zero: the shared dimensionality is \
         not enough to create a shared space"
    )]
    DegenerateSolution,

    /// `test` was called with no retained shared space and no override.
    #[error("no shared space available: run train first or supply one explicitly")]
    MissingSharedSpace,
}

pub type Result<T> = std::result::Result<T, HyperalignError>;
