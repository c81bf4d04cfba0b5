use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::activation::{ConceptActivation, ConceptId};

/// Per-concept record of the weight changes one consolidation pass made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptDelta {
    pub concept: ConceptId,
    /// Episodes that drove the change.
    pub source_episodes: Vec<String>,
    /// Neighbour concept -> net weight change.
    pub weight_changes: HashMap<ConceptId, f64>,
    /// Activation pattern after the pass.
    pub resulting_activation: ConceptActivation,
    /// Total energy improvement attributed to this concept's episodes.
    pub energy_improvement: f64,
}
