//! Request/response types for the boundary surface, one pair per
//! operation. All types are serde-serializable so any transport can
//! carry them.

mod learner;
mod scheduler;
mod vault;

pub use learner::*;
pub use scheduler::*;
pub use vault::*;

use serde::{Deserialize, Serialize};

use engram_core::errors::{EngramError, ErrorKind};

/// Client-visible error body: a stable machine kind plus a human
/// message. Never carries internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngramError> for ApiError {
    fn from(error: &EngramError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
