use super::ErrorKind;

/// Weight-graph errors.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("self-edge ({concept}, {concept}) is not representable")]
    SelfEdge { concept: u32 },

    #[error("non-finite weight {value} for edge ({a}, {b})")]
    NonFiniteWeight { a: u32, b: u32, value: f64 },

    #[error("weight graph is locked by another consolidation job")]
    WriterBusy,

    #[error("graph snapshot {path} failed to load: {reason}")]
    SnapshotLoad { path: String, reason: String },
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SelfEdge { .. } | Self::NonFiniteWeight { .. } => ErrorKind::InvalidInput,
            Self::WriterBusy => ErrorKind::Conflict,
            Self::SnapshotLoad { .. } => ErrorKind::Internal,
        }
    }
}
