//! # hyperalign
//!
//! Deep hyperalignment — functional alignment of multiple subjects'
//! high-dimensional time series (subject × time × feature) into one shared
//! low-dimensional space, so per-subject data become directly comparable.
//!
//! ## Components
//!
//! 1. **Feature extractor** (`model`) — a per-subject feed-forward network
//!    projecting raw observations into a candidate shared space
//! 2. **Optimizers** (`optim`) — SGD and Adam, rebound fresh every round
//! 3. **Loss table** (`loss`) — closed {mse, soft, mean, norm} dispatch
//! 4. **Alignment solver** (`align`) — regularized hyperalignment producing
//!    an orthonormal shared basis from the stacked projections
//! 5. **Orchestrator** (`dha`) — the alternating-minimization loop with
//!    best-result tracking and degenerate-solution detection
//!
//! ## Flow
//!
//! raw views → per-subject extractor training against the current shared
//! space → stacked projections → alignment solve → refreshed shared space →
//! next round; the lowest-error round's result is returned.

pub mod align;
pub mod dha;
pub mod error;
pub mod loss;
pub mod model;
pub mod optim;

pub use align::{AlignmentResult, AlignmentSolver};
pub use dha::{Dha, DhaConfig};
pub use error::{HyperalignError, Result};
pub use loss::LossKind;
pub use model::{Activation, Mlp};
pub use optim::OptimizerKind;
