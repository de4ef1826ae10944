#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod client;
pub mod convert;
pub mod discovery;
mod error;
pub mod health;
pub mod process;
pub mod registry;
pub mod transport;
pub mod wire;

pub use client::PluginClient;
pub use convert::ExternalPlugin;
pub use discovery::{DiscoveredPlugin, discover};
pub use error::{Error, Result};
pub use health::{HealthReport, HealthStatus};
pub use process::{PluginProcess, PluginState};
pub use registry::{PluginRegistry, RegistryConfig, RegistryConfigBuilder};
pub use transport::{Endpoint, TransportKind, negotiate};

/// Tracing target for plugin operations.
pub const TRACING_TARGET: &str = "credo_plugin";
