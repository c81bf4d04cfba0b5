//! # engram-coupling
//!
//! The oscillator coupling map: pairwise strengths and phase shifts
//! derived from the dominant spectral modes. Updates are the only write
//! path and are gated by the stability constraint; everyone else reads.

mod map;

pub use map::{CouplingMap, CouplingUpdateOutcome, CouplingUpdateRequest};
