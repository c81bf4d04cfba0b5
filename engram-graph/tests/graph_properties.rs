//! Property tests for the weight graph invariants.

use proptest::prelude::*;

use engram_graph::WeightGraph;

fn edge_ops() -> impl Strategy<Value = Vec<(u32, u32, f64)>> {
    proptest::collection::vec(
        (0u32..20, 0u32..20, -1.0f64..1.0).prop_filter("no self-edges", |(a, b, _)| a != b),
        1..64,
    )
}

proptest! {
    // Symmetry holds after any mutation sequence.
    #[test]
    fn symmetry_is_preserved(ops in edge_ops()) {
        let mut g = WeightGraph::new(0.05);
        for (a, b, w) in &ops {
            g.set(*a, *b, *w).unwrap();
        }
        for (a, b, w) in g.iter_edges() {
            prop_assert!(a < b);
            prop_assert!((g.get(a, b) - w).abs() < 1e-15);
            prop_assert!((g.get(b, a) - w).abs() < 1e-15);
        }
    }

    // No edge below the prune threshold survives.
    #[test]
    fn no_subthreshold_edges(ops in edge_ops()) {
        let mut g = WeightGraph::new(0.05);
        for (a, b, w) in ops {
            g.set(a, b, w).unwrap();
        }
        for (_, _, w) in g.iter_edges() {
            prop_assert!(w.abs() >= 0.05);
        }
    }

    // Raising the threshold via prune() never decreases sparsity.
    #[test]
    fn pruning_never_decreases_sparsity(ops in edge_ops(), bump in 0.0f64..0.5) {
        let mut g = WeightGraph::new(0.05);
        for (a, b, w) in ops {
            g.set(a, b, w).unwrap();
        }
        let before = g.sparsity();
        g.prune(0.05 + bump);
        prop_assert!(g.sparsity() >= before - 1e-15);
    }

    // Sparsity always sits in [0, 1].
    #[test]
    fn sparsity_is_bounded(ops in edge_ops()) {
        let mut g = WeightGraph::new(0.05);
        for (a, b, w) in ops {
            g.set(a, b, w).unwrap();
        }
        let s = g.sparsity();
        prop_assert!((0.0..=1.0).contains(&s));
    }
}
