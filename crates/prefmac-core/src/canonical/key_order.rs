//! Source versus sorted key order of a map.

use serde::Serialize;

use crate::value::PrefValue;

/// Where the source order of a map first departs from byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyDivergence {
    /// Zero-based position in the key list.
    pub position: usize,
    /// Key found at `position` in source order.
    pub source_key: String,
    /// Key found at `position` after sorting.
    pub sorted_key: String,
}

/// Top-level key order of a map value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyOrderAnalysis {
    /// Keys as they appear in the input.
    pub source_order: Vec<String>,
    /// Keys sorted byte-wise.
    pub sorted_order: Vec<String>,
    /// First mismatch, `None` if the input is already sorted.
    pub first_divergence: Option<KeyDivergence>,
}

impl KeyOrderAnalysis {
    /// Analyzes a map value. Returns `None` for any other kind.
    #[must_use]
    pub fn of(value: &PrefValue) -> Option<Self> {
        let map = value.as_map()?;
        let source_order: Vec<String> = map.keys().map(str::to_owned).collect();
        let mut sorted_order = source_order.clone();
        sorted_order.sort();

        let first_divergence = source_order
            .iter()
            .zip(&sorted_order)
            .position(|(a, b)| a != b)
            .map(|position| KeyDivergence {
                position,
                source_key: source_order[position].clone(),
                sorted_key: sorted_order[position].clone(),
            });

        Some(Self {
            source_order,
            sorted_order,
            first_divergence,
        })
    }

    /// True if source order already equals byte order.
    #[must_use]
    pub const fn already_sorted(&self) -> bool {
        self.first_divergence.is_none()
    }
}
