//! # Errors
//!
//! Only misconfiguration is fatal. Numerical degradation and physically
//! empty phase space are ordinary outcomes and never surface here.

/// Fatal configuration errors raised while assembling a propagation setup
#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    #[error("process `{0}` is not registered")]
    UnregisteredProcess(String),

    #[error("medium `{0}` is not known")]
    UnknownMedium(String),

    #[error("scattering model `{0}` is not known")]
    UnknownScattering(String),

    #[error("particle `{0}` is not known")]
    UnknownParticle(String),

    #[error("{process} cannot describe {particle}: {reason}")]
    InvalidParticle {
        process: String,
        particle: String,
        reason: String,
    },

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PropagationError>;
