use serde::{Deserialize, Serialize};

use super::defaults;

/// Durability policy for segment writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsyncMode {
    /// fsync after every append.
    Always,
    /// fsync at most once per configured interval; always on segment close.
    Interval,
    /// Never fsync explicitly (OS decides).
    Off,
}

/// Episodic-vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Segment rotation size.
    pub segment_size_bytes: u64,
    pub fsync_mode: FsyncMode,
    pub fsync_interval_secs: u64,
    /// Force a full index rebuild from the log at startup.
    pub index_rebuild_on_start: bool,
    /// Width of the binary activation form this vault accepts.
    pub binary_width: u32,
    /// Episode quota; puts beyond it fail with QuotaExceeded.
    pub max_episodes: usize,
    /// Episode read-cache capacity.
    pub cache_capacity: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            segment_size_bytes: defaults::DEFAULT_SEGMENT_SIZE_BYTES,
            fsync_mode: FsyncMode::Always,
            fsync_interval_secs: defaults::DEFAULT_FSYNC_INTERVAL_SECS,
            index_rebuild_on_start: false,
            binary_width: defaults::DEFAULT_BINARY_WIDTH,
            max_episodes: defaults::DEFAULT_MAX_EPISODES,
            cache_capacity: defaults::DEFAULT_CACHE_CAPACITY,
        }
    }
}
