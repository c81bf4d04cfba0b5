use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engram_core::episode::{Episode, EpisodeFilter};
use engram_core::models::VaultStats;

use super::ApiError;

/// PutEpisode response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEpisodeResponse {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<ApiError>,
}

/// ListRecent request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRecentRequest {
    pub limit: usize,
    #[serde(flatten)]
    pub filter: EpisodeFilter,
}

/// ListRecent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecentResponse {
    pub episodes: Vec<Episode>,
    pub total: usize,
    pub has_more: bool,
}

/// GetStats request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRequest {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub type StatsResponse = VaultStats;

/// PurgeTTL request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeTtlRequest {
    pub max_age_hours: u64,
    pub min_ref_count: u32,
    pub dry_run: bool,
}

/// PurgeTTL response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeTtlResponse {
    pub success: bool,
    pub purged_count: usize,
    pub freed_bytes: u64,
    pub error: Option<ApiError>,
}
