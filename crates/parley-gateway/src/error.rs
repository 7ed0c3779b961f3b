use thiserror::Error;

/// Outcomes of hub operations, consumed by the transport adapters.
/// Validation and not-found reasons are safe to show to the caller;
/// storage failures surface as a generic "operation failed".
#[derive(Debug, Error)]
pub enum HubError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("operation failed")]
    Storage(#[source] anyhow::Error),
}

impl HubError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
