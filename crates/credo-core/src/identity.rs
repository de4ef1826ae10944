//! Consumer identities and wildcard-aware matching.
//!
//! A consumer identity is a keyed attribute set describing the resource for
//! which credentials are being resolved, e.g. an OCI registry host. The
//! canonical string form sorts attributes lexicographically and joins them as
//! `k1=v1,k2=v2,...`, which makes it a stable map key for the credential
//! graph and its caches.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::typed::TypeTag;

/// Distinguished attribute holding the versioned consumer type.
pub const ATTR_TYPE: &str = "type";
/// Conventional attribute naming the host a consumer talks to.
pub const ATTR_HOSTNAME: &str = "hostname";
/// Conventional attribute holding a slash-separated hierarchical key.
pub const ATTR_PATH: &str = "path";

/// Wildcard consumer type accepted by generic repository plugins.
pub const ANY_CONSUMER_TYPE: &str = "*";

/// A keyed attribute set describing a credential consumer.
///
/// Attributes are kept sorted, so [`ConsumerIdentity::to_string`] yields the
/// canonical serialisation directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(From, Into)]
#[serde(transparent)]
pub struct ConsumerIdentity(BTreeMap<String, String>);

impl ConsumerIdentity {
    /// Creates an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an identity with only the `type` attribute set.
    pub fn with_type(consumer_type: impl Into<String>) -> Self {
        let mut identity = Self::new();
        identity.set_type(consumer_type);
        identity
    }

    /// Returns the value of an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Sets an attribute, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes an attribute.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Sets an attribute and returns the identity, for chained construction.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the raw `type` attribute.
    pub fn type_attr(&self) -> Option<&str> {
        self.get(ATTR_TYPE)
    }

    /// Replaces the `type` attribute.
    pub fn set_type(&mut self, consumer_type: impl Into<String>) {
        self.0.insert(ATTR_TYPE.into(), consumer_type.into());
    }

    /// Returns the conventional `hostname` attribute.
    pub fn hostname(&self) -> Option<&str> {
        self.get(ATTR_HOSTNAME)
    }

    /// Returns the conventional `path` attribute.
    pub fn path(&self) -> Option<&str> {
        self.get(ATTR_PATH)
    }

    /// Parses the versioned consumer type from the `type` attribute.
    ///
    /// Fails with [`Error::MissingType`] when the attribute is absent or
    /// empty.
    pub fn parse_type(&self) -> Result<TypeTag> {
        match self.type_attr() {
            Some(raw) if !raw.is_empty() => TypeTag::parse(raw),
            _ => Err(Error::MissingType),
        }
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the identity has no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over attributes in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Matches this identity as a pattern against a concrete subject.
    ///
    /// Every attribute of the pattern must be present in the subject with an
    /// equal value, except `path`, which is compared segment-wise: a `*`
    /// segment matches exactly one subject segment and a trailing `**`
    /// matches any remainder. The relation is asymmetric; an identity always
    /// matches itself.
    pub fn matches(&self, subject: &ConsumerIdentity) -> bool {
        for (key, value) in &self.0 {
            if key == ATTR_PATH {
                match subject.get(ATTR_PATH) {
                    Some(subject_path) if path_matches(value, subject_path) => continue,
                    _ => return false,
                }
            }
            if subject.get(key) != Some(value.as_str()) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for ConsumerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, (key, value)) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConsumerIdentity {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for ConsumerIdentity {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Segment-wise path matching with `*` and trailing `**` wildcards.
fn path_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut subject_segments = subject.split('/');
    loop {
        match (pattern_segments.next(), subject_segments.next()) {
            (None, None) => return true,
            (Some("**"), _) => return true,
            (Some(pattern_segment), Some(subject_segment)) => {
                if pattern_segment != "*" && pattern_segment != subject_segment {
                    return false;
                }
            }
            (Some(_), None) | (None, Some(_)) => return false,
        }
    }
}
