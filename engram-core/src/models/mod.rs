//! Shared result and record models.

mod coupling;
mod delta;
mod mode;
mod report;
mod stats;
mod trace;

pub use coupling::OscillatorCoupling;
pub use delta::ConceptDelta;
pub use mode::{DominantConcept, SpectralMode};
pub use report::{ConsolidationReport, ProcessingOutcome, ProcessingReport, RecoveryReport};
pub use stats::{ReplayStats, VaultStats};
pub use trace::{ActivationSnapshot, ActivationTrace};
