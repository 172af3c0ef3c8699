use thiserror::Error;

/// Errors surfaced by a [`crate::ResourceProvider`], mapped onto HTTP status
/// codes at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The thing or band does not exist.
    #[error("not found")]
    NotFound,
    /// The verb is inherently unsupported; an integrator must bind a real
    /// provider for it to work.
    #[error("never implemented")]
    NeverImplemented,
    /// The verb is recognized but intentionally unsupported by this provider.
    #[error("not implemented")]
    NotImplemented,
    /// Precondition violation or provider-internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::NotFound => 404,
            ProviderError::NeverImplemented | ProviderError::NotImplemented => 501,
            ProviderError::Internal(_) => 500,
        }
    }
}
