//! Vault statistics aggregation.

use chrono::{DateTime, Utc};

use engram_core::models::VaultStats;

use crate::catalog::EpisodeMeta;

/// Aggregate stats over the metas inside the optional time range.
pub fn compute<'a>(
    metas: impl Iterator<Item = &'a EpisodeMeta>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> VaultStats {
    let mut stats = VaultStats::default();
    let mut energy_sum = 0.0;

    for meta in metas {
        if let Some(since) = since {
            if meta.created_at < since {
                continue;
            }
        }
        if let Some(until) = until {
            if meta.created_at > until {
                continue;
            }
        }
        stats.total_episodes += 1;
        stats.total_bytes += meta.stored_bytes();
        energy_sum += meta.energy;
        for tag in &meta.tags {
            *stats.by_tag.entry(tag.clone()).or_insert(0) += 1;
        }
        *stats.by_source.entry(meta.source_type.clone()).or_insert(0) += 1;
        let age_hours = (now - meta.created_at).num_hours().max(0) as u64;
        *stats.age_hours_histogram.entry(age_hours).or_insert(0) += 1;
    }

    if stats.total_episodes > 0 {
        stats.mean_energy = energy_sum / stats.total_episodes as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use engram_core::activation::ConceptActivation;
    use engram_core::episode::Episode;

    fn meta(hours_old: i64, energy: f64, tags: &[&str]) -> EpisodeMeta {
        let mut e = Episode::new(ConceptActivation::SparseIds { active: vec![1] }, energy);
        e.created_at = Utc::now() - Duration::hours(hours_old);
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        EpisodeMeta::from_episode(&e, 0, 0, 32)
    }

    #[test]
    fn aggregates_counts_energy_and_age_buckets() {
        let metas = vec![meta(0, 0.2, &["x"]), meta(0, 0.4, &["x", "y"]), meta(5, 0.6, &[])];
        let now = Utc::now();
        let stats = compute(metas.iter(), None, None, now);
        assert_eq!(stats.total_episodes, 3);
        assert_eq!(stats.by_tag["x"], 2);
        assert_eq!(stats.by_tag["y"], 1);
        assert!((stats.mean_energy - 0.4).abs() < 1e-12);
        assert_eq!(stats.age_hours_histogram[&5], 1);
        assert_eq!(stats.age_hours_histogram[&0], 2);
    }

    #[test]
    fn range_bounds_are_applied() {
        let metas = vec![meta(1, 0.2, &[]), meta(100, 0.9, &[])];
        let now = Utc::now();
        let stats = compute(metas.iter(), Some(now - Duration::hours(10)), None, now);
        assert_eq!(stats.total_episodes, 1);
    }
}
