#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod dag;
mod error;
mod ingest;
mod resolve;
mod resolver;

pub use dag::{CredentialDag, EdgeTag};
pub use error::{Error, Result};
pub use resolver::{GraphResolver, Options, to_graph};

/// Tracing target for graph operations.
pub const TRACING_TARGET: &str = "credo_graph";
