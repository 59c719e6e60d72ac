//! Per-integration sync metadata.
//!
//! External trackers record their own bookkeeping in an issue's `sync` block
//! (remote numbers, last-synced timestamps, flags). The shape differs per
//! integration, so values are a small closed set of variants rather than an
//! arbitrary dynamic type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sync metadata keyed by integration name (e.g. `github`).
pub type SyncData = BTreeMap<String, SyncValue>;

/// A single value in the sync metadata tree.
///
/// Maps are ordered so that rendering an issue is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncValue {
    /// Boolean flag
    Bool(bool),

    /// Integral number (remote issue numbers, counters)
    Integer(i64),

    /// Floating point number
    Float(f64),

    /// Free-form string (URLs, timestamps, remote IDs)
    String(String),

    /// Nested map of values
    Map(BTreeMap<String, SyncValue>),
}

impl SyncValue {
    /// Returns the string value if this is a [`SyncValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is a [`SyncValue::Integer`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a [`SyncValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the nested map if this is a [`SyncValue::Map`].
    pub fn as_map(&self) -> Option<&BTreeMap<String, SyncValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&SyncValue> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl fmt::Display for SyncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for SyncValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for SyncValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for SyncValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for SyncValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for SyncValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_yaml_variants() {
        let yaml = "number: 42\nurl: https://example.com/1\nopen: true\nweight: 0.5\n";
        let map: BTreeMap<String, SyncValue> = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(map["number"], SyncValue::Integer(42));
        assert_eq!(map["url"].as_str(), Some("https://example.com/1"));
        assert_eq!(map["open"].as_bool(), Some(true));
        assert_eq!(map["weight"], SyncValue::Float(0.5));
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        let map: BTreeMap<String, SyncValue> =
            serde_yaml::from_str("a: \"true\"\nb: \"12\"\n").unwrap();
        assert_eq!(map["a"], SyncValue::from("true"));
        assert_eq!(map["b"], SyncValue::from("12"));
    }

    #[test]
    fn test_nested_lookup() {
        let yaml = "github:\n  number: 7\n  repo: acme/widgets\n";
        let map: SyncData = serde_yaml::from_str(yaml).unwrap();

        let github = &map["github"];
        assert_eq!(github.get("number").and_then(SyncValue::as_i64), Some(7));
        assert_eq!(
            github.get("repo").and_then(SyncValue::as_str),
            Some("acme/widgets")
        );
        assert!(github.get("missing").is_none());
    }

    #[test]
    fn test_display_map() {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), SyncValue::Integer(1));
        inner.insert("b".to_string(), SyncValue::Bool(false));
        assert_eq!(SyncValue::Map(inner).to_string(), "{a: 1, b: false}");
    }
}
