use super::ErrorKind;

/// Episodic-vault errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid activation: {reason}")]
    InvalidActivation { reason: String },

    #[error("invalid energy {value}: must be finite and non-negative")]
    InvalidEnergy { value: f64 },

    #[error("episode quota exceeded: limit {limit} (suggest purging ~{suggested_purge} episodes)")]
    QuotaExceeded { limit: usize, suggested_purge: usize },

    #[error("episode not found: {id}")]
    EpisodeNotFound { id: String },

    #[error("duplicate episode id: {id}")]
    DuplicateId { id: String },

    #[error("segment {segment} corrupt at offset {offset}")]
    SegmentCorrupt { segment: u64, offset: u64 },

    #[error("index corrupt: {index}")]
    IndexCorrupt { index: String },
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidActivation { .. } | Self::InvalidEnergy { .. } => ErrorKind::InvalidInput,
            Self::QuotaExceeded { .. } => ErrorKind::ResourceExhausted,
            Self::EpisodeNotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateId { .. } => ErrorKind::Conflict,
            Self::SegmentCorrupt { .. } | Self::IndexCorrupt { .. } => ErrorKind::Internal,
        }
    }
}
