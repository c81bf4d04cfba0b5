//! Hopfield pair energy and the wake-sleep gradient over sparse patterns.

use std::collections::HashMap;

use rayon::prelude::*;

use engram_core::activation::{ConceptActivation, ConceptId};
use engram_graph::WeightGraph;

/// Pattern energy E(x) = -sum_{i<j} w_ij s_i s_j over the active pairs.
pub fn pattern_energy(pattern: &ConceptActivation, graph: &WeightGraph) -> f64 {
    let ids = pattern.active_ids();
    let mut energy = 0.0;
    for (k, &i) in ids.iter().enumerate() {
        let si = pattern.strength_of(i);
        for &j in &ids[k + 1..] {
            energy -= graph.get(i, j) * si * pattern.strength_of(j);
        }
    }
    energy
}

/// Pairwise outer product of a sparse pattern, canonical keys (i < j).
fn outer_pairs(pattern: &ConceptActivation) -> HashMap<(ConceptId, ConceptId), f64> {
    let ids = pattern.active_ids();
    let mut pairs = HashMap::with_capacity(ids.len() * ids.len() / 2);
    for (k, &i) in ids.iter().enumerate() {
        let si = pattern.strength_of(i);
        for &j in &ids[k + 1..] {
            pairs.insert((i, j), si * pattern.strength_of(j));
        }
    }
    pairs
}

/// Wake-sleep gradient g = <x x^T>_pos - <x x^T>_neg, restricted to pairs
/// active in the positive pattern or any negative sample.
pub fn wake_sleep_gradient(
    positive: &ConceptActivation,
    negatives: &[ConceptActivation],
) -> HashMap<(ConceptId, ConceptId), f64> {
    let mut gradient = outer_pairs(positive);

    if negatives.is_empty() {
        return gradient;
    }
    let scale = 1.0 / negatives.len() as f64;
    let negative_sum = negatives
        .par_iter()
        .map(outer_pairs)
        .reduce(HashMap::new, |mut acc, pairs| {
            for (key, v) in pairs {
                *acc.entry(key).or_insert(0.0) += v;
            }
            acc
        });
    for (key, v) in negative_sum {
        *gradient.entry(key).or_insert(0.0) -= v * scale;
    }
    gradient
}
