//! Property tests for the consolidation cycle.

use proptest::prelude::*;

use engram_core::activation::ConceptActivation;
use engram_core::episode::Episode;
use engram_core::params::ReplayParameters;
use engram_graph::WeightGraph;
use engram_replay::{ReplayContext, ReplayEngine};

fn episode(id: &str, ids: Vec<u32>, energy: f64) -> Episode {
    let mut e = Episode::new(ConceptActivation::SparseIds { active: ids }, energy);
    e.id = id.to_string();
    e
}

fn id_set(max: u32) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::btree_set(0..max, 2..6)
        .prop_map(|s| s.into_iter().collect::<Vec<u32>>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Sparsity never decreases across a full cycle under default params.
    #[test]
    fn sparsity_is_monotone_under_defaults(
        patterns in proptest::collection::vec(id_set(32), 1..5),
        seed_edges in proptest::collection::vec((0u32..32, 0u32..32, 0.02f64..0.5), 0..8),
    ) {
        let engine = ReplayEngine::new(64);
        let mut graph = WeightGraph::new(0.01);
        for (a, b, w) in seed_edges {
            if a != b {
                graph.set(a, b, w).unwrap();
            }
        }
        let before = graph.sparsity();
        let episodes: Vec<Episode> = patterns
            .into_iter()
            .enumerate()
            .map(|(i, ids)| episode(&format!("e{i}"), ids, 0.5))
            .collect();
        engine
            .consolidate(
                &episodes,
                &ReplayParameters::default(),
                &mut graph,
                "prop-job",
                &ReplayContext::detached(),
                None,
            )
            .unwrap();
        prop_assert!(graph.sparsity() >= before - 1e-12);
    }

    // Graph invariants hold after any cycle: canonical keys, no
    // sub-threshold edges, symmetry.
    #[test]
    fn graph_invariants_hold_after_cycle(patterns in proptest::collection::vec(id_set(24), 1..4)) {
        let engine = ReplayEngine::new(32);
        let mut graph = WeightGraph::new(0.005);
        let episodes: Vec<Episode> = patterns
            .into_iter()
            .enumerate()
            .map(|(i, ids)| episode(&format!("e{i}"), ids, 0.3))
            .collect();
        engine
            .consolidate(
                &episodes,
                &ReplayParameters::default(),
                &mut graph,
                "prop-job",
                &ReplayContext::detached(),
                None,
            )
            .unwrap();
        for (a, b, w) in graph.iter_edges() {
            prop_assert!(a < b);
            prop_assert!(w.abs() >= graph.prune_threshold());
            prop_assert!((graph.get(b, a) - w).abs() < 1e-15);
        }
    }

    // Reported energy improvement equals the sum over deltas' episodes is
    // consistent: improvement is finite and counters add up.
    #[test]
    fn counters_always_add_up(patterns in proptest::collection::vec(id_set(16), 1..6)) {
        let engine = ReplayEngine::new(32);
        let mut graph = WeightGraph::new(0.005);
        let episodes: Vec<Episode> = patterns
            .into_iter()
            .enumerate()
            .map(|(i, ids)| episode(&format!("e{i}"), ids, 0.3))
            .collect();
        let report = engine
            .consolidate(
                &episodes,
                &ReplayParameters::default(),
                &mut graph,
                "prop-job",
                &ReplayContext::detached(),
                None,
            )
            .unwrap();
        prop_assert_eq!(
            report.episodes_selected,
            report.episodes_processed + report.episodes_failed + report.episodes_skipped
        );
        prop_assert!(report.total_energy_improvement.is_finite());
    }
}
