/// Engram system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of concepts a single activation may carry.
pub const MAX_ACTIVE_CONCEPTS: usize = 4096;

/// Maximum episodes accepted in one consolidation batch.
pub const MAX_EPISODES_PER_BATCH: usize = 1000;

/// Magnitude below which a mode-vector entry counts toward sparsity.
pub const MODE_SPARSITY_EPSILON: f64 = 1e-6;

/// Eigenvalue magnitude band around 1.0 treated as marginally stable
/// for prediction uncertainty.
pub const MARGINAL_STABILITY_BAND: f64 = 0.05;

/// Sliding-window length for the annealing early-stop check.
pub const ENERGY_WINDOW: usize = 8;

/// Feature flags.
pub const FEATURE_INCREMENTAL_DMD: bool = true;
pub const FEATURE_ADAPTIVE_SCHEDULING: bool = true;
