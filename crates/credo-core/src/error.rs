//! Core error types.

use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core data model.
#[derive(Debug, Error)]
pub enum Error {
    /// A consumer identity or typed object carries no `type` attribute.
    #[error("missing type attribute")]
    MissingType,

    /// A typed-object kind is not registered with the scheme.
    #[error("unknown typed-object kind: {0:?}")]
    SchemeUnknown(String),

    /// A typed-object payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A plugin call failed.
    #[error("plugin error: {0}")]
    Plugin(#[source] BoxedError),
}

impl Error {
    /// Wraps an arbitrary plugin failure.
    pub fn plugin(err: impl Into<BoxedError>) -> Self {
        Self::Plugin(err.into())
    }
}
