//! Episodes: the unit the vault stores.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activation::ConceptActivation;

/// Where an episode came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Coarse source type ("agent", "replay", "ingest", ...).
    pub source_type: String,
    /// Source-local identifier.
    pub source_id: String,
    /// Owning user, when there is one.
    pub user_id: Option<String>,
    /// Free-form source attributes.
    pub attributes: HashMap<String, String>,
}

/// A stored memory unit. Immutable except for `ref_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Time-prefixed unique id (uuid v7); assigned on write when empty.
    pub id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Reference count; the only mutable field. Episodes with
    /// `ref_count >= min_ref_count` survive TTL purge.
    pub ref_count: u32,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Source descriptor.
    pub source: SourceDescriptor,
    /// Scalar energy in [0, inf); drives replay selection priority.
    pub energy: f64,
    /// The activation pattern this episode records.
    pub activation: ConceptActivation,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl Episode {
    /// Mint a fresh time-prefixed episode id.
    pub fn new_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    /// Build an episode with a fresh id and the current clock.
    pub fn new(activation: ConceptActivation, energy: f64) -> Self {
        Self {
            id: Self::new_id(),
            created_at: Utc::now(),
            ref_count: 0,
            tags: Vec::new(),
            source: SourceDescriptor::default(),
            energy,
            activation,
            metadata: HashMap::new(),
        }
    }

    /// Age relative to `now`, in whole hours (clamped below at zero).
    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_hours().max(0)
    }
}

impl PartialEq for Episode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Intersection of optional predicates over episodes.
///
/// `include_tags` matches when ANY listed tag is present (OR);
/// `exclude_tags` rejects when any listed tag is present (NOT).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_energy: Option<f64>,
    pub source_type: Option<String>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
}

impl EpisodeFilter {
    /// Whether `episode` passes every present predicate.
    pub fn matches(&self, episode: &Episode) -> bool {
        if let Some(since) = self.since {
            if episode.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if episode.created_at > until {
                return false;
            }
        }
        if let Some(min_energy) = self.min_energy {
            if episode.energy < min_energy {
                return false;
            }
        }
        if let Some(ref st) = self.source_type {
            if &episode.source.source_type != st {
                return false;
            }
        }
        if !self.include_tags.is_empty()
            && !self.include_tags.iter().any(|t| episode.tags.contains(t))
        {
            return false;
        }
        if self.exclude_tags.iter().any(|t| episode.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ConceptActivation;

    fn make_episode(tags: &[&str], energy: f64) -> Episode {
        let mut e = Episode::new(
            ConceptActivation::SparseIds { active: vec![1, 2] },
            energy,
        );
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = EpisodeFilter::default();
        assert!(f.matches(&make_episode(&[], 0.0)));
    }

    #[test]
    fn include_tags_are_or_semantics() {
        let f = EpisodeFilter {
            include_tags: vec!["x".into(), "y".into()],
            ..Default::default()
        };
        assert!(f.matches(&make_episode(&["y"], 0.0)));
        assert!(!f.matches(&make_episode(&["z"], 0.0)));
    }

    #[test]
    fn exclude_tags_reject() {
        let f = EpisodeFilter {
            exclude_tags: vec!["secret".into()],
            ..Default::default()
        };
        assert!(!f.matches(&make_episode(&["secret", "x"], 0.0)));
    }

    #[test]
    fn min_energy_filters() {
        let f = EpisodeFilter {
            min_energy: Some(0.5),
            ..Default::default()
        };
        assert!(f.matches(&make_episode(&[], 0.9)));
        assert!(!f.matches(&make_episode(&[], 0.1)));
    }

    #[test]
    fn new_ids_are_time_ordered() {
        let a = Episode::new_id();
        let b = Episode::new_id();
        assert!(a < b || a[..8] == b[..8]);
    }
}
