#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod credentials;
mod error;
pub mod identity;
pub mod plugin;
pub mod typed;

pub use config::{Config, ConsumerEntry, DirectCredentials, RepositoryEntry};
pub use credentials::Credentials;
pub use error::{BoxedError, Error, Result};
pub use identity::ConsumerIdentity;
pub use typed::{Raw, Scheme, TypeTag, Typed};

/// Tracing target for core operations.
pub const TRACING_TARGET: &str = "credo_core";
