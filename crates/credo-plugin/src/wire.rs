//! Wire-protocol types shared between the host and plugin binaries.
//!
//! A plugin binary supports two invocations: the `capabilities` subcommand,
//! printing a single [`Capabilities`] JSON document on stdout, and
//! `--config <json>` with a [`StartupConfig`], after which the plugin serves
//! the HTTP endpoints below on its announced transport. Credentials for
//! `/resolve` travel in the `Authorization` header as a JSON map, keeping
//! request bodies stable and loggable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use credo_core::{ConsumerIdentity, Raw};

use crate::transport::TransportKind;

/// Subcommand printing the capabilities document.
pub const CAPABILITIES_SUBCOMMAND: &str = "capabilities";
/// Flag passing the startup configuration.
pub const CONFIG_FLAG: &str = "--config";

/// Capability kind for credential plugins.
pub const PLUGIN_KIND_CREDENTIAL: &str = "credential";
/// Capability kind for repository plugins.
pub const PLUGIN_KIND_REPOSITORY: &str = "repository";

/// Health endpoint path.
pub const HEALTHZ_PATH: &str = "/healthz";
/// Consumer-identity endpoint path.
pub const CONSUMER_IDENTITY_PATH: &str = "/consumer-identity";
/// Resolve endpoint path.
pub const RESOLVE_PATH: &str = "/resolve";

/// The capabilities a plugin binary advertises at discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Implemented types per plugin kind (`credential`, `repository`).
    #[serde(default)]
    pub types: HashMap<String, Vec<TypeCapability>>,
    /// Configuration object types the plugin wants forwarded at startup.
    #[serde(default, rename = "configTypes")]
    pub config_types: Vec<String>,
}

impl Capabilities {
    /// Returns the advertised capabilities of one kind.
    pub fn of_kind(&self, kind: &str) -> &[TypeCapability] {
        self.types.get(kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// One type a plugin implements, with an optional config schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeCapability {
    /// The implemented type tag; `*` for any-consumer repository plugins.
    #[serde(rename = "type")]
    pub kind: String,
    /// JSON schema the host validates `config` payloads against before
    /// dispatch.
    #[serde(default, rename = "jsonSchema", skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
}

/// Startup configuration serialised into the `--config` argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Plugin id, the binary's file name.
    pub id: String,
    /// Negotiated transport the plugin must listen on.
    #[serde(rename = "type")]
    pub transport: TransportKind,
    /// Seconds of inactivity after which the plugin is expected to
    /// self-exit; never policed by the host.
    #[serde(rename = "idleTimeout")]
    pub idle_timeout_secs: u64,
    /// Configuration objects matching the plugin's requested `configTypes`.
    #[serde(default, rename = "configTypes")]
    pub config_types: Vec<Raw>,
}

/// Request body of the consumer-identity endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerIdentityForConfigRequest {
    /// The typed config (credential spec or repository spec).
    pub config: Raw,
}

/// Request body of the resolve endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// The typed config (credential spec or repository spec).
    pub config: Raw,
    /// The consumer identity being resolved.
    pub identity: ConsumerIdentity,
}

/// Error envelope returned by plugins on non-success statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Failure description.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_document_shape() {
        let json = serde_json::json!({
            "types": {
                "credential": [
                    { "type": "HashiCorpVault/v1", "jsonSchema": { "type": "object" } }
                ],
                "repository": [
                    { "type": "*" }
                ]
            },
            "configTypes": ["vault.config.credo/v1"]
        });
        let capabilities: Capabilities = serde_json::from_value(json).unwrap();

        assert_eq!(capabilities.of_kind(PLUGIN_KIND_CREDENTIAL).len(), 1);
        assert_eq!(capabilities.of_kind(PLUGIN_KIND_REPOSITORY)[0].kind, "*");
        assert_eq!(capabilities.config_types, ["vault.config.credo/v1"]);
        assert!(capabilities.of_kind("unknown").is_empty());
    }

    #[test]
    fn startup_config_uses_wire_field_names() {
        let config = StartupConfig {
            id: "vault".into(),
            transport: TransportKind::Unix,
            idle_timeout_secs: 60,
            config_types: Vec::new(),
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["type"], "unix");
        assert_eq!(value["idleTimeout"], 60);
        assert_eq!(value["id"], "vault");
    }
}
