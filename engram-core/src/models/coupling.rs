use serde::{Deserialize, Serialize};

use crate::activation::ConceptId;

/// Pairwise coupling between two concept oscillators.
///
/// The pair is canonical (`a < b`). `previous_strength` keeps the value
/// replaced by the last applied update for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorCoupling {
    pub a: ConceptId,
    pub b: ConceptId,
    pub strength: f64,
    /// Relative phase, radians, in (-pi, pi].
    pub phase_shift: f64,
    /// Mode that proposed this coupling.
    pub source_mode: String,
    pub previous_strength: f64,
}

impl OscillatorCoupling {
    /// Canonicalise an unordered pair.
    pub fn canonical_pair(x: ConceptId, y: ConceptId) -> (ConceptId, ConceptId) {
        if x <= y {
            (x, y)
        } else {
            (y, x)
        }
    }
}
