//! # engram-jobs
//!
//! Long-running work as explicit Job entities: a bounded worker pool,
//! cooperative cancellation at enumerated safe points, status polling,
//! crash-safe job records, and cron/adaptive scheduling.

mod cancel;
mod controller;
mod pool;
mod schedule;

pub use cancel::CancelToken;
pub use controller::{JobController, JobCtx};
pub use pool::WorkerPool;
pub use schedule::{normalise_cron, next_occurrence, ScheduleDecision, ScheduledEntry, Scheduler};
