use super::ErrorKind;

/// Replay/consolidation errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid replay parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("empty episode batch")]
    EmptyBatch,

    #[error("too many episode failures: {failed} of {total} (threshold {threshold:.2})")]
    TooManyFailures {
        failed: usize,
        total: usize,
        threshold: f64,
    },

    #[error("gradient error for episode {episode}: {reason}")]
    GradientFailed { episode: String, reason: String },

    #[error("consolidation cancelled")]
    Cancelled,
}

impl ReplayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters { .. } | Self::EmptyBatch => ErrorKind::InvalidInput,
            Self::TooManyFailures { .. } | Self::GradientFailed { .. } => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
