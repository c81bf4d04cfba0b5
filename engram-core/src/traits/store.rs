use chrono::{DateTime, Utc};

use crate::episode::{Episode, EpisodeFilter};
use crate::errors::EngramResult;
use crate::models::VaultStats;

/// Episode storage seam: put + get + list + stats + TTL purge.
///
/// The vault engine is the canonical implementation; tests substitute
/// in-memory stores.
pub trait IEpisodeStore: Send + Sync {
    /// Validate and append an episode, returning its (possibly assigned) id.
    fn put(&self, episode: Episode) -> EngramResult<String>;

    fn get(&self, id: &str) -> EngramResult<Option<Episode>>;

    /// Filtered listing, newest first, ties broken by id ascending.
    /// Returns (episodes, total matching, has_more).
    fn list_recent(
        &self,
        filter: &EpisodeFilter,
        limit: usize,
    ) -> EngramResult<(Vec<Episode>, usize, bool)>;

    fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> EngramResult<VaultStats>;

    /// TTL purge. Returns (purged_count, freed_bytes).
    fn purge_ttl(
        &self,
        max_age_hours: u64,
        min_ref_count: u32,
        dry_run: bool,
    ) -> EngramResult<(usize, u64)>;
}
