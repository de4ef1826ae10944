//! The credential configuration document.
//!
//! The document carries an ordered list of consumers, each pairing one or
//! more identities with an ordered credential list, and an ordered list of
//! fallback repository entries. Serialisation formats are a collaborator
//! concern; these types only define the shape.

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::identity::ConsumerIdentity;
use crate::typed::{Raw, Typed};

/// Canonical tag of the root configuration object.
pub const CONFIG_TYPE: &str = "credentials.config.ocm.software/v1";

/// The root configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The versioned configuration type tag.
    #[serde(rename = "type", default = "default_config_type")]
    pub kind: String,
    /// Ordered consumer entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ConsumerEntry>,
    /// Ordered fallback repository entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryEntry>,
}

fn default_config_type() -> String {
    CONFIG_TYPE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: default_config_type(),
            consumers: Vec::new(),
            repositories: Vec::new(),
        }
    }
}

impl Config {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotes legacy single-identity consumers into the `identities` list.
    ///
    /// A re-serialised document always uses the current form.
    pub fn normalize(&mut self) {
        for consumer in &mut self.consumers {
            consumer.normalize();
        }
    }
}

impl Typed for Config {
    const TYPE: &'static str = CONFIG_TYPE;
    const ALIASES: &'static [&'static str] = &["credentials.config.ocm.software"];
}

/// A consumer entry: identities sharing one ordered credential list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerEntry {
    /// Legacy single-identity form; promoted into `identities` on access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ConsumerIdentity>,
    /// The identities this credential list applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<ConsumerIdentity>,
    /// Direct credentials and credential specs, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Raw>,
}

impl ConsumerEntry {
    /// Creates an entry for a single identity.
    pub fn for_identity(identity: ConsumerIdentity) -> Self {
        Self {
            identity: None,
            identities: vec![identity],
            credentials: Vec::new(),
        }
    }

    /// Appends a credential object.
    pub fn credential(mut self, credential: Raw) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Iterates the effective identities, honouring the legacy form.
    ///
    /// When `identities` is empty and the legacy `identity` field is set,
    /// the single identity is yielded instead.
    pub fn effective_identities(&self) -> impl Iterator<Item = &ConsumerIdentity> {
        let legacy = if self.identities.is_empty() {
            self.identity.as_ref()
        } else {
            None
        };
        self.identities.iter().chain(legacy)
    }

    /// Moves a legacy `identity` into the `identities` list.
    pub fn normalize(&mut self) {
        if let Some(identity) = self.identity.take() {
            if self.identities.is_empty() {
                self.identities.push(identity);
            }
        }
    }
}

/// A fallback repository entry wrapping one typed repository spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// The typed repository spec, dispatched to a repository plugin.
    pub repository: Raw,
}

impl RepositoryEntry {
    /// Wraps a repository spec.
    pub fn new(repository: Raw) -> Self {
        Self { repository }
    }
}

/// Direct credentials attached to a consumer at ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectCredentials {
    /// The credential properties contributed to the consumer's vertex.
    #[serde(default)]
    pub properties: Credentials,
}

impl DirectCredentials {
    /// Wraps a credential bundle.
    pub fn new(properties: Credentials) -> Self {
        Self { properties }
    }

    /// Returns whether a raw object is a direct-credentials variant.
    pub fn is_direct(raw: &Raw) -> bool {
        raw.tag().is_ok_and(|tag| tag.name() == "Credentials")
    }
}

impl Typed for DirectCredentials {
    const TYPE: &'static str = "Credentials/v1";
    const ALIASES: &'static [&'static str] = &["Credentials"];
}
