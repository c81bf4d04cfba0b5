use criterion::{black_box, criterion_group, criterion_main, Criterion};

use engram_core::activation::ConceptActivation;
use engram_core::episode::Episode;
use engram_core::params::ReplayParameters;
use engram_graph::WeightGraph;
use engram_replay::{ReplayContext, ReplayEngine};

fn episodes(count: usize) -> Vec<Episode> {
    (0..count)
        .map(|i| {
            let base = (i % 50) as u32;
            let mut e = Episode::new(
                ConceptActivation::SparseIds {
                    active: vec![base, base + 3, base + 7, base + 11],
                },
                0.5,
            );
            e.id = format!("bench-{i}");
            e
        })
        .collect()
}

fn bench_consolidation(c: &mut Criterion) {
    let engine = ReplayEngine::new(128);
    let batch = episodes(20);
    let params = ReplayParameters {
        annealing_steps: 20,
        negative_samples: 5,
        ..Default::default()
    };

    c.bench_function("consolidate_20_episodes", |b| {
        b.iter(|| {
            let mut graph = WeightGraph::new(0.001);
            engine
                .consolidate(
                    black_box(&batch),
                    &params,
                    &mut graph,
                    "bench-job",
                    &ReplayContext::detached(),
                    None,
                )
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_consolidation);
criterion_main!(benches);
