//! The deep hyperalignment core: configuration plus the alternating
//! orchestrator.

mod config;
mod orchestrator;

pub use config::DhaConfig;
pub use orchestrator::Dha;
