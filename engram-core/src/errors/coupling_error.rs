use super::ErrorKind;

/// Oscillator-coupling errors.
#[derive(Debug, thiserror::Error)]
pub enum CouplingError {
    #[error(
        "stability violation: update would drop the system stability index \
         from {reference:.4} to {proposed:.4} (allowed drop {epsilon:.4})"
    )]
    StabilityViolation {
        reference: f64,
        proposed: f64,
        epsilon: f64,
    },

    #[error("no modes to derive couplings from")]
    NoSourceModes,

    #[error("invalid coupling request: {reason}")]
    InvalidRequest { reason: String },
}

impl CouplingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StabilityViolation { .. } => ErrorKind::StabilityViolation,
            Self::NoSourceModes => ErrorKind::NotFound,
            Self::InvalidRequest { .. } => ErrorKind::InvalidInput,
        }
    }
}
