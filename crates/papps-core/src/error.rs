use thiserror::Error;

/// Failure classes surfaced by the engine.
///
/// Each variant is attached to an `anyhow::Error` as a context layer, so the
/// human readable chain stays intact while callers can still classify the
/// failure with `err.downcast_ref::<PappsError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PappsError {
    #[error("{0}")]
    Validation(String),

    #[error("{step} command failed")]
    StepExecution { step: &'static str },

    #[error("Another application is already installed in that folder and no alternative name could be found.")]
    DirectoryAllocation,

    #[error("Failed to load {url}")]
    Transport { url: String },

    #[error("Failed to parse {url}")]
    Parse { url: String },

    #[error("cyclic dependency detected: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("EULA has been refused, installation is being aborted.")]
    EulaRefused,

    #[error("The downloaded file hash doesn't match the expected hash. Please check your firewall and anti-virus rules and try again later.")]
    HashMismatch,

    #[error("application is not registered: {url}")]
    NotRegistered { url: String },
}

impl PappsError {
    pub fn kind(err: &anyhow::Error) -> Option<&PappsError> {
        err.downcast_ref::<PappsError>()
    }
}
