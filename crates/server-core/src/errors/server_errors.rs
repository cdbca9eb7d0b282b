use oauthly_infra_common::ErrorContext;
use thiserror::Error;

use super::ConfigurationError;

/// Errors surfaced by the engine while processing a transaction
///
/// These are internal failures, never client-facing protocol outcomes:
/// the transport adapter maps them to a generic `server_error` response.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Startup validation failure
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An internal contract break: a stage result a prior stage was
    /// supposed to store is missing, a response was finalized twice, a
    /// backward state transition was attempted, ...
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A persistence backend failed
    #[error("store error: {0}")]
    Store(String),

    /// The token-handling component failed in an unexpected way
    #[error("token handler error: {0}")]
    Token(String),
}

impl ServerError {
    /// Build an invariant violation annotated with the component and
    /// operation that detected it
    pub fn invariant(context: ErrorContext) -> Self {
        ServerError::InvariantViolation(context.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
