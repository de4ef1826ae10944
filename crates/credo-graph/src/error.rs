//! Resolution error types.

use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or resolving the credential graph.
#[derive(Debug, Error)]
pub enum Error {
    /// A core data-model failure (missing type, scheme, decode, plugin).
    #[error(transparent)]
    Core(#[from] credo_core::Error),

    /// No vertex matched the consumer, or the matched vertex yielded an
    /// empty bundle. Recoverable: triggers the repository fallback when one
    /// is configured.
    #[error("no direct credentials for consumer {identity:?}")]
    NoDirectCredentials {
        /// Canonical identity string of the consumer.
        identity: String,
    },

    /// No repository plugin returned credentials for the consumer.
    #[error("no indirect credentials for consumer {identity:?}{}", join_causes(.causes))]
    NoIndirectCredentials {
        /// Canonical identity string of the consumer.
        identity: String,
        /// Failures reported by the individual repository tasks.
        causes: Vec<Error>,
    },

    /// A credential type in the configuration has no registered plugin.
    #[error("no credential plugin registered for credential type {0:?}")]
    NoCredentialPlugin(String),

    /// Both endpoints of a requested edge are the same vertex.
    #[error("self-referential edge on vertex {0:?}")]
    SelfReference(String),

    /// Adding the edge would close a directed cycle.
    #[error("edge {from:?} -> {to:?} would create a cycle")]
    WouldCreateCycle {
        /// Canonical identity string of the edge source.
        from: String,
        /// Canonical identity string of the edge target.
        to: String,
    },

    /// An edge endpoint does not exist in the graph.
    #[error("vertex {0:?} does not exist")]
    VertexNotFound(String),
}

impl Error {
    /// Returns whether this is the recoverable no-direct-credentials kind.
    pub fn is_no_direct_credentials(&self) -> bool {
        matches!(self, Self::NoDirectCredentials { .. })
    }

    /// Returns whether this is the no-indirect-credentials kind.
    pub fn is_no_indirect_credentials(&self) -> bool {
        matches!(self, Self::NoIndirectCredentials { .. })
    }

    /// Returns whether this is the cycle-rejection kind.
    pub fn is_would_create_cycle(&self) -> bool {
        matches!(self, Self::WouldCreateCycle { .. })
    }

    /// Returns whether the underlying cause is a missing identity type.
    pub fn is_missing_type(&self) -> bool {
        matches!(self, Self::Core(credo_core::Error::MissingType))
    }
}

fn join_causes(causes: &[Error]) -> String {
    if causes.is_empty() {
        return String::new();
    }
    let joined = causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(": {joined}")
}
