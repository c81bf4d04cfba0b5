//! Default values shared by the config structs.

pub const DEFAULT_SEGMENT_SIZE_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_BINARY_WIDTH: u32 = 256;
pub const DEFAULT_MAX_EPISODES: usize = 1_000_000;
pub const DEFAULT_CACHE_CAPACITY: u64 = 4096;
pub const DEFAULT_FSYNC_INTERVAL_SECS: u64 = 5;

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
pub const DEFAULT_MAX_EPISODES_PER_JOB: usize = 200;
pub const DEFAULT_LOAD_THRESHOLD: usize = 4;
pub const DEFAULT_ENERGY_THRESHOLD: f64 = 0.0;

pub const DEFAULT_MAX_MODES: usize = 16;
pub const DEFAULT_COUPLING_UPDATE_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_STABILITY_ALARM_THRESHOLD: f64 = 0.0;
pub const DEFAULT_COUPLING_GAIN: f64 = 0.1;
pub const DEFAULT_MAX_COUPLING_STRENGTH: f64 = 1.0;
pub const DEFAULT_STABILITY_EPSILON: f64 = 0.05;
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.01;
