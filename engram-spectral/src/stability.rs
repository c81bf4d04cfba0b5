//! Stability analysis over the retained modes and the current couplings.
//!
//! The system stability index folds coupling alignment into each mode's
//! effective growth: couplings aligned with a mode's dominant concepts
//! amplify it. Recommendations are advisory only; nothing here mutates
//! the coupling map.

use std::collections::HashMap;

use petgraph::graph::UnGraph;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use engram_core::activation::ConceptId;
use engram_core::models::SpectralMode;

/// Per-mode stability detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeStability {
    pub mode_id: String,
    pub eigenvalue_magnitude: f64,
    /// Re(log lambda) / dt.
    pub lyapunov_exponent: f64,
    pub stability_index: f64,
    pub stable: bool,
}

/// Stability aggregated over one concept group (a connected component of
/// the coupling pair graph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStability {
    pub concepts: Vec<ConceptId>,
    pub stability_index: f64,
}

/// The full advisory analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityAnalysis {
    pub system_index: f64,
    pub unstable_mode_ids: Vec<String>,
    /// Present when details were requested.
    pub modes: Vec<ModeStability>,
    pub by_group: Vec<GroupStability>,
    pub recommendations: Vec<String>,
}

/// Effective growth of one mode under the coupling field:
/// |lambda| plus the summed alignment of couplings with the mode's
/// dominant concepts.
fn effective_growth(mode: &SpectralMode, couplings: &[(ConceptId, ConceptId, f64)]) -> f64 {
    let weights: HashMap<ConceptId, f64> = mode
        .dominant_concepts
        .iter()
        .map(|d| (d.concept, d.weight))
        .collect();
    let alignment: f64 = couplings
        .iter()
        .map(|&(a, b, s)| {
            s * weights.get(&a).copied().unwrap_or(0.0) * weights.get(&b).copied().unwrap_or(0.0)
        })
        .sum();
    mode.magnitude() + alignment
}

/// System stability index in [-1, 1]: the minimum over modes of
/// `1 - 2 max(0, effective_growth - 1)`. 1.0 with no modes; equals the
/// plain modal index when no couplings exist.
pub fn system_index(
    modes: &[SpectralMode],
    couplings: &[(ConceptId, ConceptId, f64)],
) -> f64 {
    modes
        .iter()
        .map(|m| (1.0 - 2.0 * (effective_growth(m, couplings) - 1.0).max(0.0)).clamp(-1.0, 1.0))
        .fold(1.0, f64::min)
}

/// Build the full advisory analysis.
pub fn analyze(
    modes: &[SpectralMode],
    couplings: &[(ConceptId, ConceptId, f64)],
    include_details: bool,
    include_recommendations: bool,
) -> StabilityAnalysis {
    let system = system_index(modes, couplings);

    let unstable_mode_ids: Vec<String> = modes
        .iter()
        .filter(|m| !m.is_stable())
        .map(|m| m.id.clone())
        .collect();

    let details = if include_details {
        modes
            .iter()
            .map(|m| ModeStability {
                mode_id: m.id.clone(),
                eigenvalue_magnitude: m.magnitude(),
                lyapunov_exponent: m.lyapunov_exponent(),
                stability_index: m.stability_index,
                stable: m.is_stable(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let by_group = group_stability(modes, couplings);

    let recommendations = if include_recommendations {
        modes
            .iter()
            .filter(|m| !m.is_stable())
            .map(|m| {
                format!(
                    "attenuate couplings driven by mode {} by a factor proportional to {:.4}",
                    m.id,
                    m.magnitude() - 1.0
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    StabilityAnalysis {
        system_index: system,
        unstable_mode_ids,
        modes: details,
        by_group,
        recommendations,
    }
}

/// Concept groups are connected components of the coupling pair graph; a
/// group's index is the worst index among modes with significant mass in
/// the group.
fn group_stability(
    modes: &[SpectralMode],
    couplings: &[(ConceptId, ConceptId, f64)],
) -> Vec<GroupStability> {
    if couplings.is_empty() {
        return Vec::new();
    }
    let mut graph: UnGraph<ConceptId, ()> = UnGraph::new_undirected();
    let mut nodes: HashMap<ConceptId, _> = HashMap::new();
    for &(a, b, _) in couplings {
        let na = *nodes.entry(a).or_insert_with(|| graph.add_node(a));
        let nb = *nodes.entry(b).or_insert_with(|| graph.add_node(b));
        graph.add_edge(na, nb, ());
    }
    let mut union = UnionFind::new(graph.node_count());
    for edge in graph.edge_indices() {
        if let Some((a, b)) = graph.edge_endpoints(edge) {
            union.union(a.index(), b.index());
        }
    }
    let mut components: HashMap<usize, Vec<ConceptId>> = HashMap::new();
    for node in graph.node_indices() {
        components
            .entry(union.find(node.index()))
            .or_default()
            .push(graph[node]);
    }

    let mut groups: Vec<GroupStability> = components
        .into_values()
        .map(|mut concepts| {
            concepts.sort_unstable();
            let index = modes
                .iter()
                .filter(|m| {
                    let mass: f64 = m
                        .dominant_concepts
                        .iter()
                        .filter(|d| concepts.binary_search(&d.concept).is_ok())
                        .map(|d| d.weight)
                        .sum();
                    let total: f64 = m.dominant_concepts.iter().map(|d| d.weight).sum();
                    total > 0.0 && mass / total > 0.2
                })
                .map(|m| m.stability_index)
                .fold(1.0, f64::min);
            GroupStability {
                concepts,
                stability_index: index,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.concepts.cmp(&b.concepts));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::models::DominantConcept;

    fn mode(id: &str, magnitude: f64, concepts: &[(u32, f64)]) -> SpectralMode {
        SpectralMode {
            id: id.into(),
            eigenvalue_re: magnitude,
            eigenvalue_im: 0.0,
            basis: concepts.iter().map(|&(c, _)| c).collect(),
            vector: concepts.iter().map(|&(_, w)| w).collect(),
            dt_secs: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            growth_factor: magnitude,
            sparsity: 0.0,
            time_constant_secs: 1.0,
            stability_index: (1.0 - 2.0 * (magnitude - 1.0).max(0.0)).clamp(-1.0, 1.0),
            dominance: magnitude,
            dominant_concepts: concepts
                .iter()
                .map(|&(c, w)| DominantConcept {
                    concept: c,
                    weight: w,
                    phase_shift: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn index_is_one_when_all_modes_stable() {
        let modes = vec![mode("a", 0.9, &[(1, 1.0)]), mode("b", 0.5, &[(2, 1.0)])];
        assert_eq!(system_index(&modes, &[]), 1.0);
    }

    #[test]
    fn index_drops_below_one_with_an_unstable_mode() {
        let modes = vec![mode("a", 1.1, &[(1, 1.0)])];
        let idx = system_index(&modes, &[]);
        assert!(idx < 1.0);
        assert!((idx - 0.8).abs() < 1e-12);
    }

    #[test]
    fn aligned_couplings_reduce_the_index() {
        let modes = vec![mode("a", 0.98, &[(1, 1.0), (2, 1.0)])];
        let without = system_index(&modes, &[]);
        let with = system_index(&modes, &[(1, 2, 0.5)]);
        assert_eq!(without, 1.0);
        assert!(with < without);
    }

    #[test]
    fn analysis_lists_unstable_modes_and_recommends() {
        let modes = vec![mode("bad", 1.2, &[(1, 1.0)]), mode("ok", 0.8, &[(2, 1.0)])];
        let analysis = analyze(&modes, &[], true, true);
        assert_eq!(analysis.unstable_mode_ids, vec!["bad".to_string()]);
        assert_eq!(analysis.modes.len(), 2);
        assert!(analysis.recommendations[0].contains("bad"));
        assert!(analysis.modes.iter().any(|m| m.lyapunov_exponent > 0.0));
    }

    #[test]
    fn groups_follow_coupling_components() {
        let modes = vec![mode("a", 1.1, &[(1, 1.0), (2, 0.8)])];
        let couplings = vec![(1, 2, 0.3), (5, 6, 0.2)];
        let analysis = analyze(&modes, &couplings, false, false);
        assert_eq!(analysis.by_group.len(), 2);
        let g12 = analysis
            .by_group
            .iter()
            .find(|g| g.concepts == vec![1, 2])
            .unwrap();
        // The unstable mode dominates this group.
        assert!(g12.stability_index < 1.0);
        let g56 = analysis
            .by_group
            .iter()
            .find(|g| g.concepts == vec![5, 6])
            .unwrap();
        assert_eq!(g56.stability_index, 1.0);
    }
}
