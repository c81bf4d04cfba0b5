//! Error types for every Engram subsystem.
//!
//! Each subsystem has its own `thiserror` enum; [`EngramError`] is the
//! umbrella the public surface speaks. Every error maps onto a stable
//! machine-readable [`ErrorKind`] via [`EngramError::kind`] so clients
//! never have to parse messages.

mod coupling_error;
mod graph_error;
mod job_error;
mod replay_error;
mod spectral_error;
mod vault_error;

pub use coupling_error::CouplingError;
pub use graph_error::GraphError;
pub use job_error::JobError;
pub use replay_error::ReplayError;
pub use spectral_error::SpectralError;
pub use vault_error::VaultError;

use serde::{Deserialize, Serialize};

/// Result alias used across the workspace.
pub type EngramResult<T> = Result<T, EngramError>;

/// Stable machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    ResourceExhausted,
    StabilityViolation,
    Cancelled,
    Internal,
}

/// Umbrella error for the whole substrate.
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Spectral(#[from] SpectralError),

    #[error(transparent)]
    Coupling(#[from] CouplingError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl EngramError {
    /// Build an `InvalidInput` error from anything displayable.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Build a `NotFound` error naming the missing thing.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// The stable machine kind for this error. Total: every variant maps.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Vault(e) => e.kind(),
            Self::Graph(e) => e.kind(),
            Self::Replay(e) => e.kind(),
            Self::Spectral(e) => e.kind(),
            Self::Coupling(e) => e.kind(),
            Self::Job(e) => e.kind(),
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Serialization { .. } => ErrorKind::Internal,
        }
    }
}
