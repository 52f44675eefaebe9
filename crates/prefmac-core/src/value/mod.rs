//! Format-independent model of preference values.
//!
//! A [`PrefValue`] is an owned tree, so it is finite and acyclic by
//! construction. Maps keep their source insertion order; whether that order
//! survives into the canonical form is a policy decision made by
//! [`crate::canonical`].
//!
//! Values are built from JSON text with [`PrefValue::from_json_str`], which
//! rejects duplicate keys and trees deeper than [`MAX_DEPTH`] instead of
//! silently coercing them.

mod parse;
mod path;

use std::fmt;

pub use path::{DottedPath, Lookup, Snapshot};
use serde_json::Number;

use crate::error::MalformedInput;

/// Maximum nesting depth accepted when building a value.
pub const MAX_DEPTH: usize = 128;

/// A preference value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number. Integers keep their exact decimal form.
    Number(Number),
    /// JSON string.
    String(String),
    /// Ordered list. Element order is always significant.
    List(Vec<PrefValue>),
    /// Keyed map with unique keys in source order.
    Map(PrefMap),
}

impl PrefValue {
    /// Parses JSON text into a value, preserving map key order.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput`] if the text is not valid JSON, a map
    /// repeats a key, or the tree is nested deeper than [`MAX_DEPTH`].
    pub fn from_json_str(input: &str) -> Result<Self, MalformedInput> {
        let value = parse::parse_with_duplicate_detection(input)?;
        value.check_depth()?;
        Ok(value)
    }

    /// Returns a short name of the variant, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// True for an empty list or an empty map.
    #[must_use]
    pub fn is_empty_container(&self) -> bool {
        match self {
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Returns the map if this value is one.
    #[must_use]
    pub const fn as_map(&self) -> Option<&PrefMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the string if this value is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Rejects trees nested deeper than [`MAX_DEPTH`].
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::MaxDepthExceeded`] on violation.
    pub fn check_depth(&self) -> Result<(), MalformedInput> {
        check_depth_at(self, 0)
    }
}

fn check_depth_at(value: &PrefValue, depth: usize) -> Result<(), MalformedInput> {
    if depth > MAX_DEPTH {
        return Err(MalformedInput::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        PrefValue::List(items) => items
            .iter()
            .try_for_each(|item| check_depth_at(item, depth + 1)),
        PrefValue::Map(map) => map
            .values()
            .try_for_each(|item| check_depth_at(item, depth + 1)),
        _ => Ok(()),
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<PrefMap> for PrefValue {
    fn from(value: PrefMap) -> Self {
        Self::Map(value)
    }
}

impl TryFrom<serde_json::Value> for PrefValue {
    type Error = MalformedInput;

    /// Converts a `serde_json` tree. Key order follows the source map's
    /// iteration order.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let converted = from_json_value(value)?;
        converted.check_depth()?;
        Ok(converted)
    }
}

fn from_json_value(value: serde_json::Value) -> Result<PrefValue, MalformedInput> {
    Ok(match value {
        serde_json::Value::Null => PrefValue::Null,
        serde_json::Value::Bool(b) => PrefValue::Bool(b),
        serde_json::Value::Number(n) => PrefValue::Number(n),
        serde_json::Value::String(s) => PrefValue::String(s),
        serde_json::Value::Array(items) => PrefValue::List(
            items
                .into_iter()
                .map(from_json_value)
                .collect::<Result<_, _>>()?,
        ),
        serde_json::Value::Object(obj) => {
            let mut map = PrefMap::with_capacity(obj.len());
            for (key, item) in obj {
                map.try_insert(key, from_json_value(item)?)?;
            }
            PrefValue::Map(map)
        },
    })
}

/// Map with unique string keys kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefMap {
    entries: Vec<(String, PrefValue)>,
}

impl PrefMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates an empty map with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry, rejecting a key that is already present.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::DuplicateKey`] if `key` is already present.
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: PrefValue,
    ) -> Result<(), MalformedInput> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(MalformedInput::DuplicateKey { key });
        }
        self.entries.push((key, value));
        Ok(())
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Looks up a key mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut PrefValue> {
        self.entries
            .iter_mut()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// True if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Keeps only the entries for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &PrefValue) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &PrefValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PrefValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Rebuilds a map from entries already known to have unique keys.
    pub(crate) fn from_unique_entries(entries: Vec<(String, PrefValue)>) -> Self {
        debug_assert!(
            {
                let mut keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                keys.sort_unstable();
                keys.windows(2).all(|w| w[0] != w[1])
            },
            "entries must have unique keys"
        );
        Self { entries }
    }
}

impl fmt::Display for PrefValue {
    /// Compact JSON with source key order; for logs and reports only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::canonical::to_json_string(self))
    }
}
