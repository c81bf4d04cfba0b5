use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use engram_core::activation::ConceptId;
use engram_core::errors::{EngramResult, GraphError};

use crate::snapshot::WeightSnapshot;

/// Sparse symmetric weight matrix over concept pairs.
///
/// Edges are stored once under the canonical key (a < b); self-edges are
/// rejected. Any weight with |w| below the prune threshold is absent.
/// Sparsity is maintained incrementally: every mutation is O(1) bookkeeping
/// over the edge count and the observed concept universe.
#[derive(Debug, Clone)]
pub struct WeightGraph {
    edges: HashMap<(ConceptId, ConceptId), f64>,
    concepts: HashSet<ConceptId>,
    prune_threshold: f64,
    /// Bumped on every mutation; snapshots carry the value they saw.
    generation: u64,
}

impl WeightGraph {
    pub fn new(prune_threshold: f64) -> Self {
        Self {
            edges: HashMap::new(),
            concepts: HashSet::new(),
            prune_threshold: prune_threshold.abs(),
            generation: 0,
        }
    }

    /// Rebuild from a flat edge list (loading a persisted snapshot).
    pub fn from_edges(
        prune_threshold: f64,
        edges: impl IntoIterator<Item = (ConceptId, ConceptId, f64)>,
    ) -> EngramResult<Self> {
        let mut graph = Self::new(prune_threshold);
        for (a, b, w) in edges {
            graph.set(a, b, w)?;
        }
        graph.generation = 0;
        Ok(graph)
    }

    pub fn prune_threshold(&self) -> f64 {
        self.prune_threshold
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current weight for the pair, 0.0 when absent. Order-insensitive.
    pub fn get(&self, a: ConceptId, b: ConceptId) -> f64 {
        if a == b {
            return 0.0;
        }
        let key = Self::key(a, b);
        self.edges.get(&key).copied().unwrap_or(0.0)
    }

    /// Set the weight for a pair. Writing |w| below the prune threshold
    /// deletes the edge. Rejects self-edges and non-finite weights.
    pub fn set(&mut self, a: ConceptId, b: ConceptId, w: f64) -> EngramResult<()> {
        if a == b {
            return Err(GraphError::SelfEdge { concept: a }.into());
        }
        if !w.is_finite() {
            return Err(GraphError::NonFiniteWeight { a, b, value: w }.into());
        }
        let key = Self::key(a, b);
        self.concepts.insert(a);
        self.concepts.insert(b);
        if w.abs() < self.prune_threshold {
            self.edges.remove(&key);
        } else {
            self.edges.insert(key, w);
        }
        self.generation += 1;
        Ok(())
    }

    /// Add a delta to the pair's weight (convenience for gradient updates).
    pub fn add(&mut self, a: ConceptId, b: ConceptId, dw: f64) -> EngramResult<()> {
        let current = self.get(a, b);
        self.set(a, b, current + dw)
    }

    /// Iterate non-zero edges as (a, b, w) with a < b.
    pub fn iter_edges(&self) -> impl Iterator<Item = (ConceptId, ConceptId, f64)> + '_ {
        self.edges.iter().map(|(&(a, b), &w)| (a, b, w))
    }

    /// Non-zero edge count.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Observed concept universe size.
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// 1 - |edges| / (N (N - 1) / 2) over the observed universe.
    /// 1.0 for fewer than two concepts.
    pub fn sparsity(&self) -> f64 {
        let n = self.concepts.len();
        if n < 2 {
            return 1.0;
        }
        let max_edges = (n * (n - 1) / 2) as f64;
        1.0 - self.edges.len() as f64 / max_edges
    }

    /// Remove every edge with |w| below the given threshold and adopt it
    /// as the new prune threshold. Returns the number of edges removed.
    pub fn prune(&mut self, threshold: f64) -> usize {
        let threshold = threshold.abs();
        let before = self.edges.len();
        self.edges.retain(|_, w| w.abs() >= threshold);
        self.prune_threshold = threshold;
        let removed = before - self.edges.len();
        if removed > 0 {
            self.generation += 1;
            tracing::debug!(removed, threshold, "pruned weight edges");
        }
        removed
    }

    /// Point-in-time read-only snapshot (O(edges) copy, shared thereafter).
    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot::new(
            Arc::new(self.edges.clone()),
            self.prune_threshold,
            self.generation,
            self.sparsity(),
        )
    }

    /// Sorted flat edge list (deterministic persistence order).
    pub fn sorted_edges(&self) -> Vec<(ConceptId, ConceptId, f64)> {
        let mut edges: Vec<_> = self.iter_edges().collect();
        edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        edges
    }

    fn key(a: ConceptId, b: ConceptId) -> (ConceptId, ConceptId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_symmetric() {
        let mut g = WeightGraph::new(0.01);
        g.set(2, 1, 0.5).unwrap();
        assert_eq!(g.get(1, 2), 0.5);
        assert_eq!(g.get(2, 1), 0.5);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn self_edges_are_rejected() {
        let mut g = WeightGraph::new(0.01);
        assert!(g.set(3, 3, 1.0).is_err());
        assert_eq!(g.get(3, 3), 0.0);
    }

    #[test]
    fn subthreshold_set_deletes() {
        let mut g = WeightGraph::new(0.1);
        g.set(1, 2, 0.5).unwrap();
        g.set(1, 2, 0.05).unwrap();
        assert_eq!(g.get(1, 2), 0.0);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn sparsity_tracks_edge_share() {
        let mut g = WeightGraph::new(0.01);
        g.set(1, 2, 0.4).unwrap();
        g.set(2, 3, 0.4).unwrap();
        g.set(1, 3, 0.4).unwrap();
        // 3 concepts, 3 of 3 possible edges.
        assert!((g.sparsity() - 0.0).abs() < 1e-12);
        g.set(1, 3, 0.0).unwrap();
        assert!((g.sparsity() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn prune_removes_and_raises_threshold() {
        let mut g = WeightGraph::new(0.01);
        g.set(1, 2, 0.4).unwrap();
        g.set(2, 3, 0.05).unwrap();
        g.set(1, 3, -0.2).unwrap();
        let removed = g.prune(0.1);
        assert_eq!(removed, 1);
        assert_eq!(g.get(2, 3), 0.0);
        assert_eq!(g.get(1, 2), 0.4);
        assert_eq!(g.get(1, 3), -0.2);
        assert_eq!(g.prune_threshold(), 0.1);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let mut g = WeightGraph::new(0.01);
        g.set(1, 2, 0.4).unwrap();
        let snap = g.snapshot();
        g.set(1, 2, 0.9).unwrap();
        assert_eq!(snap.get(1, 2), 0.4);
        assert_eq!(g.get(1, 2), 0.9);
        assert!(g.generation() > snap.generation());
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        let mut g = WeightGraph::new(0.01);
        assert!(g.set(1, 2, f64::NAN).is_err());
        assert!(g.set(1, 2, f64::INFINITY).is_err());
    }
}
