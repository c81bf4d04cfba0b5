//! Episode selection for the scheduler: filter first, then rank-weighted
//! sampling where higher-energy episodes are proportionally more likely.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use engram_core::episode::{Episode, EpisodeFilter};

/// Select up to `max` episodes from the candidates.
///
/// The filter is applied first. Survivors are ranked by energy descending
/// and sampled without replacement with weight proportional to
/// `rank_count - rank`, so the highest-energy episode is `rank_count`
/// times as likely as the lowest. Deterministic for a given seed.
pub fn select_batch(
    candidates: &[Episode],
    filter: &EpisodeFilter,
    max: usize,
    seed: u64,
) -> Vec<Episode> {
    let mut survivors: Vec<&Episode> = candidates.iter().filter(|e| filter.matches(e)).collect();
    if survivors.len() <= max {
        // Keep deterministic order: energy descending, id ascending.
        survivors.sort_by(|a, b| {
            b.energy
                .partial_cmp(&a.energy)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        return survivors.into_iter().cloned().collect();
    }

    survivors.sort_by(|a, b| {
        b.energy
            .partial_cmp(&a.energy)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut rng = StdRng::seed_from_u64(seed);
    let mut weights: Vec<f64> = (0..survivors.len())
        .map(|rank| (survivors.len() - rank) as f64)
        .collect();
    let mut picked = Vec::with_capacity(max);
    let mut remaining: Vec<usize> = (0..survivors.len()).collect();

    while picked.len() < max && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|&i| weights[i]).sum();
        let mut target = rng.gen_range(0.0..total);
        let mut chosen_pos = remaining.len() - 1;
        for (pos, &i) in remaining.iter().enumerate() {
            target -= weights[i];
            if target <= 0.0 {
                chosen_pos = pos;
                break;
            }
        }
        let idx = remaining.swap_remove(chosen_pos);
        weights[idx] = 0.0;
        picked.push(survivors[idx].clone());
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::activation::ConceptActivation;

    fn episode(id: &str, energy: f64) -> Episode {
        let mut e = Episode::new(ConceptActivation::SparseIds { active: vec![1] }, energy);
        e.id = id.to_string();
        e
    }

    #[test]
    fn under_capacity_returns_all_sorted_by_energy() {
        let pool = vec![episode("a", 0.1), episode("b", 0.9)];
        let batch = select_batch(&pool, &EpisodeFilter::default(), 10, 42);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "b");
    }

    #[test]
    fn selection_is_deterministic_per_seed() {
        let pool: Vec<Episode> = (0..50)
            .map(|i| episode(&format!("e{i:02}"), i as f64 / 50.0))
            .collect();
        let a = select_batch(&pool, &EpisodeFilter::default(), 10, 7);
        let b = select_batch(&pool, &EpisodeFilter::default(), 10, 7);
        let ids_a: Vec<&str> = a.iter().map(|e| e.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn high_energy_episodes_are_favoured() {
        let pool: Vec<Episode> = (0..100)
            .map(|i| episode(&format!("e{i:03}"), i as f64 / 100.0))
            .collect();
        // Across many seeds, the top-energy half should dominate picks.
        let mut top_half = 0usize;
        let mut total = 0usize;
        for seed in 0..20 {
            for e in select_batch(&pool, &EpisodeFilter::default(), 10, seed) {
                if e.energy >= 0.5 {
                    top_half += 1;
                }
                total += 1;
            }
        }
        assert!(top_half as f64 / total as f64 > 0.6);
    }

    #[test]
    fn filter_applies_before_sampling() {
        let mut tagged = episode("t", 0.9);
        tagged.tags = vec!["keep".into()];
        let pool = vec![tagged, episode("u", 0.99)];
        let filter = EpisodeFilter {
            include_tags: vec!["keep".into()],
            ..Default::default()
        };
        let batch = select_batch(&pool, &filter, 10, 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "t");
    }
}
