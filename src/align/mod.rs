//! Shared-space alignment: dense symmetric kernels plus the regularized
//! hyperalignment solver built on them.

pub mod linalg;
mod solver;

pub use solver::{AlignmentResult, AlignmentSolver};
