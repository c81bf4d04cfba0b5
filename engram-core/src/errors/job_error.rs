use super::ErrorKind;
use crate::job::JobState;

/// Job-controller errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("worker pool saturated: {queued} jobs queued (max {max})")]
    PoolSaturated { queued: usize, max: usize },

    #[error("invalid cron expression: {expr}")]
    InvalidCron { expr: String },

    #[error("job {id} timed out after {seconds}s")]
    TimedOut { id: String, seconds: u64 },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::JobNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } | Self::InvalidCron { .. } => ErrorKind::InvalidInput,
            Self::PoolSaturated { .. } => ErrorKind::ResourceExhausted,
            Self::TimedOut { .. } => ErrorKind::Internal,
        }
    }
}
