use super::ErrorKind;

/// Spectral-learner errors.
#[derive(Debug, thiserror::Error)]
pub enum SpectralError {
    #[error("invalid processing parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("not enough snapshots: {got} (need at least {need})")]
    NotEnoughSnapshots { got: usize, need: usize },

    #[error(
        "SVD workspace too large: {rows}x{cols} (suggest dmd_rank <= {suggested_rank} \
         or a smaller snapshot window)"
    )]
    WorkspaceTooLarge {
        rows: usize,
        cols: usize,
        suggested_rank: usize,
    },

    #[error("eigendecomposition did not converge for rank {rank}")]
    EigenFailed { rank: usize },

    #[error("no spectral modes available")]
    NoModes,

    #[error("processing cancelled")]
    Cancelled,
}

impl SpectralError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters { .. } | Self::NotEnoughSnapshots { .. } => {
                ErrorKind::InvalidInput
            }
            Self::WorkspaceTooLarge { .. } => ErrorKind::ResourceExhausted,
            Self::EigenFailed { .. } => ErrorKind::Internal,
            Self::NoModes => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
