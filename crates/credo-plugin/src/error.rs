//! Plugin subsystem error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the plugin subsystem.
#[derive(Debug, Error)]
pub enum Error {
    /// A plugin candidate could not be probed for its capabilities.
    #[error("plugin discovery failed at {path}: {message}")]
    Discovery {
        /// Path of the candidate binary or walked directory.
        path: PathBuf,
        /// Failure description.
        message: String,
    },

    /// A plugin process failed to start or never became healthy.
    #[error("plugin {id:?} failed to start: {message}")]
    Startup {
        /// Plugin id.
        id: String,
        /// Failure description.
        message: String,
    },

    /// An RPC failed: transport error, non-success status, schema-validation
    /// failure, or malformed response.
    #[error("dispatch to plugin {id:?} failed: {message}")]
    Dispatch {
        /// Plugin id.
        id: String,
        /// Failure description.
        message: String,
    },

    /// One or more plugins failed to shut down cleanly.
    #[error("plugin shutdown failed{}", join_causes(.causes))]
    Shutdown {
        /// The individual shutdown failures.
        causes: Vec<Error>,
    },

    /// Serialization of a wire payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Builds a discovery error for a path.
    pub(crate) fn discovery(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Discovery {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Builds a startup error for a plugin.
    pub(crate) fn startup(id: impl Into<String>, message: impl ToString) -> Self {
        Self::Startup {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Builds a dispatch error for a plugin.
    pub(crate) fn dispatch(id: impl Into<String>, message: impl ToString) -> Self {
        Self::Dispatch {
            id: id.into(),
            message: message.to_string(),
        }
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
