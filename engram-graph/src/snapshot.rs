use std::collections::HashMap;
use std::sync::Arc;

use engram_core::activation::ConceptId;

/// Read-only point-in-time view of the weight graph.
///
/// Cloning is cheap (Arc); the underlying map never changes after capture.
#[derive(Debug, Clone)]
pub struct WeightSnapshot {
    edges: Arc<HashMap<(ConceptId, ConceptId), f64>>,
    prune_threshold: f64,
    generation: u64,
    sparsity: f64,
}

impl WeightSnapshot {
    pub(crate) fn new(
        edges: Arc<HashMap<(ConceptId, ConceptId), f64>>,
        prune_threshold: f64,
        generation: u64,
        sparsity: f64,
    ) -> Self {
        Self {
            edges,
            prune_threshold,
            generation,
            sparsity,
        }
    }

    pub fn get(&self, a: ConceptId, b: ConceptId) -> f64 {
        if a == b {
            return 0.0;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.edges.get(&key).copied().unwrap_or(0.0)
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (ConceptId, ConceptId, f64)> + '_ {
        self.edges.iter().map(|(&(a, b), &w)| (a, b, w))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn prune_threshold(&self) -> f64 {
        self.prune_threshold
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sparsity(&self) -> f64 {
        self.sparsity
    }

    /// Neighbours of a concept with their weights.
    pub fn neighbours(&self, concept: ConceptId) -> Vec<(ConceptId, f64)> {
        self.edges
            .iter()
            .filter_map(|(&(a, b), &w)| {
                if a == concept {
                    Some((b, w))
                } else if b == concept {
                    Some((a, w))
                } else {
                    None
                }
            })
            .collect()
    }
}
