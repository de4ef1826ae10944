//! Credential bundles.

use std::collections::BTreeMap;

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

/// Conventional key for a user name.
pub const KEY_USERNAME: &str = "username";
/// Conventional key for a password.
pub const KEY_PASSWORD: &str = "password";
/// Conventional key for an access token.
pub const KEY_ACCESS_TOKEN: &str = "accessToken";
/// Conventional key for a refresh token.
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";

/// An opaque string-to-string credential mapping.
///
/// No key is privileged here; the conventional keys above are a contract
/// between plugins and callers. The core only routes, merges, and forwards
/// these maps and never inspects the values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[derive(From, Into)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stores a value, returning the previous one if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Stores a value and returns the bundle, for chained construction.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Merges another bundle into this one; `other` wins on key conflicts.
    pub fn merge(&mut self, other: &Credentials) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the bundle holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_later_entries() {
        let mut first: Credentials = [(KEY_USERNAME, "foo"), (KEY_PASSWORD, "old")]
            .into_iter()
            .collect();
        let second: Credentials = [(KEY_PASSWORD, "new")].into_iter().collect();
        first.merge(&second);

        assert_eq!(first.get(KEY_USERNAME), Some("foo"));
        assert_eq!(first.get(KEY_PASSWORD), Some("new"));
    }
}
