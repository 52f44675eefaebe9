//! Dotted preference paths and snapshot traversal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PrefValue;
use crate::error::MalformedInput;

/// A validated `.`-separated preference path such as
/// `extensions.settings.<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DottedPath(String);

impl DottedPath {
    /// Validates a path.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::EmptyPath`] for an empty string and
    /// [`MalformedInput::EmptySegment`] if any segment is empty.
    pub fn parse(path: &str) -> Result<Self, MalformedInput> {
        if path.is_empty() {
            return Err(MalformedInput::EmptyPath);
        }
        if path.split('.').any(str::is_empty) {
            return Err(MalformedInput::EmptySegment {
                path: path.to_string(),
            });
        }
        Ok(Self(path.to_string()))
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl FromStr for DottedPath {
    type Err = MalformedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DottedPath {
    type Error = MalformedInput;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DottedPath> for String {
    fn from(value: DottedPath) -> Self {
        value.0
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of resolving a dotted path.
///
/// `Absent` means no node exists at the path. A node holding `null` is
/// `Present(PrefValue::Null)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The path resolves to this node.
    Present(&'a PrefValue),
    /// Some segment of the path is missing or crosses a non-map node.
    Absent,
}

impl<'a> Lookup<'a> {
    /// Converts to an `Option`.
    #[must_use]
    pub const fn present(self) -> Option<&'a PrefValue> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }
}

/// A preference tree captured from a running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    root: PrefValue,
}

impl Snapshot {
    /// Wraps an already-built tree.
    #[must_use]
    pub const fn new(root: PrefValue) -> Self {
        Self { root }
    }

    /// Parses a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput`] for invalid JSON, duplicate keys or
    /// excessive depth.
    pub fn from_json_str(input: &str) -> Result<Self, MalformedInput> {
        PrefValue::from_json_str(input).map(Self::new)
    }

    /// The whole tree.
    #[must_use]
    pub const fn root(&self) -> &PrefValue {
        &self.root
    }

    /// Resolves `path` segment by segment from the root.
    #[must_use]
    pub fn lookup(&self, path: &DottedPath) -> Lookup<'_> {
        let mut current = &self.root;
        for segment in path.segments() {
            match current.as_map().and_then(|map| map.get(segment)) {
                Some(next) => current = next,
                None => return Lookup::Absent,
            }
        }
        Lookup::Present(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot::from_json_str(
            r#"{"extensions": {"settings": {"abc": {"state": 1}}, "ui": null}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(DottedPath::parse(""), Err(MalformedInput::EmptyPath));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for bad in ["a..b", ".a", "a.", "."] {
            assert!(
                matches!(
                    DottedPath::parse(bad),
                    Err(MalformedInput::EmptySegment { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_lookup_present() {
        let snap = snapshot();
        let path = DottedPath::parse("extensions.settings.abc.state").unwrap();
        assert_eq!(snap.lookup(&path), Lookup::Present(&PrefValue::from(1)));
    }

    #[test]
    fn test_lookup_absent_is_distinct_from_null() {
        let snap = snapshot();
        let null_path = DottedPath::parse("extensions.ui").unwrap();
        let missing = DottedPath::parse("extensions.toolbar").unwrap();
        assert_eq!(snap.lookup(&null_path), Lookup::Present(&PrefValue::Null));
        assert_eq!(snap.lookup(&missing), Lookup::Absent);
    }

    #[test]
    fn test_lookup_through_leaf_is_absent() {
        let snap = snapshot();
        let path = DottedPath::parse("extensions.settings.abc.state.deeper").unwrap();
        assert_eq!(snap.lookup(&path), Lookup::Absent);
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let path: DottedPath = serde_json::from_str(r#""a.b""#).unwrap();
        assert_eq!(path.as_str(), "a.b");
        assert!(serde_json::from_str::<DottedPath>(r#""""#).is_err());
    }
}
