//! # engram-spectral
//!
//! The Koopman spectral learner: fits a linear operator to activation
//! traces by dynamic mode decomposition (batch or incremental), maintains
//! the retained mode set, predicts future activations, and analyses
//! stability. Modes are owned here; couplings are derived elsewhere.

pub mod dmd;
mod engine;
pub mod predict;
pub mod stability;
pub mod store;

pub use engine::{ModeQuery, ModeSetState, ModeSort, SpectralEngine};
