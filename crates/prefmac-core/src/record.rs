//! Protected preference records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mac::MacTag;
use crate::value::{DottedPath, PrefValue};

/// Which keyed store protects a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// The preferences file on disk.
    File,
    /// The registry-resident copy.
    Registry,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::File => "file",
            Self::Registry => "registry",
        })
    }
}

/// One protected preference and the MAC the store recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMacRecord {
    /// Store whose keying material applies.
    pub store: StoreKind,
    /// Location of the value in the preference tree.
    pub path: DottedPath,
    /// Tag recorded by the store.
    pub expected_mac: MacTag,
    /// The value as found in the snapshot.
    pub value: PrefValue,
}

impl PathMacRecord {
    /// Bundles the four parts of a record.
    #[must_use]
    pub const fn new(
        store: StoreKind,
        path: DottedPath,
        expected_mac: MacTag,
        value: PrefValue,
    ) -> Self {
        Self {
            store,
            path,
            expected_mac,
            value,
        }
    }
}
