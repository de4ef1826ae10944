//! Versioned type tags and the typed-object scheme.
//!
//! Configuration is a heterogeneous tree of objects distinguished by a
//! `type` tag, either unversioned (`Name`) or versioned (`Name/v1`). The
//! [`Scheme`] registers prototypes under one or more tags and normalises,
//! validates, and instantiates raw objects; unregistered tags are either an
//! error or passed through opaque, depending on [`Scheme::allow_unknown`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A parsed `Name` or `Name/version` type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag {
    name: String,
    version: Option<String>,
}

impl TypeTag {
    /// Parses a tag, splitting a trailing `/vN` suffix into the version.
    ///
    /// Fails with [`Error::MissingType`] on an empty string.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::MissingType);
        }
        if let Some((name, suffix)) = raw.rsplit_once('/') {
            if !name.is_empty() && is_version(suffix) {
                return Ok(Self {
                    name: name.to_string(),
                    version: Some(suffix.to_string()),
                });
            }
        }
        Ok(Self {
            name: raw.to_string(),
            version: None,
        })
    }

    /// Returns the unversioned name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version suffix, if the tag carries one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `vN` version suffixes, e.g. `v1`.
fn is_version(suffix: &str) -> bool {
    let mut chars = suffix.chars();
    chars.next() == Some('v') && {
        let rest = chars.as_str();
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
    }
}

/// A value decodable into a registered typed object.
pub trait Typed: Serialize + DeserializeOwned + Default {
    /// Canonical versioned tag.
    const TYPE: &'static str;
    /// Accepted alias tags.
    const ALIASES: &'static [&'static str] = &[];
}

/// An opaque typed object: a `type` tag plus its remaining fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Raw {
    /// The type tag, possibly empty for untagged payloads.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// All fields other than `type`.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Raw {
    /// Creates an empty object carrying only a tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Parses the tag of this object.
    pub fn tag(&self) -> Result<TypeTag> {
        TypeTag::parse(&self.kind)
    }

    /// Encodes a typed value, tagging it with the canonical type.
    pub fn from_typed<T: Typed>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(payload) => Ok(Self {
                kind: T::TYPE.to_string(),
                payload,
            }),
            _ => Err(Error::Decode(serde::ser::Error::custom(
                "typed value did not serialize to an object",
            ))),
        }
    }

    /// Decodes the payload into a concrete type, ignoring the tag.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }

    /// Sets the canonical tag of `T` if the object is untagged.
    pub fn default_type<T: Typed>(&mut self) {
        if self.kind.is_empty() {
            self.kind = T::TYPE.to_string();
        }
    }
}

struct Entry {
    canonical: String,
    new: Box<dyn Fn() -> Result<Raw> + Send + Sync>,
    check: Box<dyn Fn(&Raw) -> Result<()> + Send + Sync>,
}

/// Registry of typed-object prototypes keyed by tag.
#[derive(Default)]
pub struct Scheme {
    entries: HashMap<String, Arc<Entry>>,
    allow_unknown: bool,
}

impl Scheme {
    /// Creates an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerates unregistered tags, passing their objects through opaque.
    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    /// Registers a prototype under its canonical tag and all aliases.
    pub fn register<T: Typed + 'static>(&mut self) {
        let entry = Arc::new(Entry {
            canonical: T::TYPE.to_string(),
            new: Box::new(|| Raw::from_typed(&T::default())),
            check: Box::new(|raw| raw.decode_payload::<T>().map(|_| ())),
        });
        for alias in T::ALIASES {
            self.entries.insert((*alias).to_string(), entry.clone());
        }
        self.entries.insert(T::TYPE.to_string(), entry);
        tracing::trace!(
            target: crate::TRACING_TARGET,
            kind = T::TYPE,
            aliases = T::ALIASES.len(),
            "registered typed-object kind"
        );
    }

    /// Returns whether a tag is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// Instantiates the zero-value prototype for a tag.
    pub fn new_object(&self, kind: &str) -> Result<Raw> {
        match self.entries.get(kind) {
            Some(entry) => (entry.new)(),
            None if self.allow_unknown => Ok(Raw::new(kind)),
            None => Err(Error::SchemeUnknown(kind.to_string())),
        }
    }

    /// Converts a raw object onto its registered prototype.
    ///
    /// The tag is normalised to the canonical form, the payload is deep
    /// copied, and the result is validated against the registered type.
    pub fn convert(&self, src: &Raw) -> Result<Raw> {
        match self.entries.get(&src.kind) {
            Some(entry) => {
                let converted = Raw {
                    kind: entry.canonical.clone(),
                    payload: src.payload.clone(),
                };
                (entry.check)(&converted)?;
                Ok(converted)
            }
            None if self.allow_unknown => Ok(src.clone()),
            None => Err(Error::SchemeUnknown(src.kind.clone())),
        }
    }

    /// Decodes a raw object into a concrete registered type.
    ///
    /// The object's tag must be the canonical tag of `T` or one of its
    /// aliases.
    pub fn convert_to<T: Typed + 'static>(&self, src: &Raw) -> Result<T> {
        if src.kind != T::TYPE && !T::ALIASES.contains(&src.kind.as_str()) {
            return Err(Error::SchemeUnknown(src.kind.clone()));
        }
        src.decode_payload()
    }

    /// Decodes one raw object from a JSON reader and converts it.
    pub fn decode<R: std::io::Read>(&self, reader: R) -> Result<Raw> {
        let raw: Raw = serde_json::from_reader(reader)?;
        self.convert(&raw)
    }
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheme")
            .field("entries", &self.entries.keys())
            .field("allow_unknown", &self.allow_unknown)
            .finish()
    }
}
