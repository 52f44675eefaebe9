//! Formatting choices that parameterize canonicalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default separator between siblings.
pub const DEFAULT_ITEM_SEPARATOR: &str = ",";

/// Default separator between a map key and its value.
pub const DEFAULT_KV_SEPARATOR: &str = ":";

/// Immutable canonicalization policy.
///
/// The default is the best-known hypothesis for the target scheme: sorted
/// keys, empty containers pruned from maps, UTF-8 left unescaped and compact
/// `,` / `:` separators. Variants are derived with the `with_*` methods,
/// which return a new policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanonicalizationPolicy {
    sort_keys: bool,
    ascii_escape: bool,
    escape_angle_bracket: bool,
    item_separator: String,
    kv_separator: String,
    prune_empty_containers: bool,
}

impl Default for CanonicalizationPolicy {
    fn default() -> Self {
        Self {
            sort_keys: true,
            ascii_escape: false,
            escape_angle_bracket: false,
            item_separator: DEFAULT_ITEM_SEPARATOR.to_string(),
            kv_separator: DEFAULT_KV_SEPARATOR.to_string(),
            prune_empty_containers: true,
        }
    }
}

impl CanonicalizationPolicy {
    /// Emits maps in source order, keeps empty containers, no extra escaping.
    ///
    /// This is plain compact JSON and is used for display.
    #[must_use]
    pub fn source_order() -> Self {
        Self {
            sort_keys: false,
            prune_empty_containers: false,
            ..Self::default()
        }
    }

    /// Whether map keys are sorted byte-wise.
    #[must_use]
    pub const fn sort_keys(&self) -> bool {
        self.sort_keys
    }

    /// Whether non-ASCII code points are written as `\uXXXX`.
    #[must_use]
    pub const fn ascii_escape(&self) -> bool {
        self.ascii_escape
    }

    /// Whether `<` is written as `\u003C`.
    #[must_use]
    pub const fn escape_angle_bracket(&self) -> bool {
        self.escape_angle_bracket
    }

    /// Separator between list elements and between map entries.
    #[must_use]
    pub fn item_separator(&self) -> &str {
        &self.item_separator
    }

    /// Separator between a map key and its value.
    #[must_use]
    pub fn kv_separator(&self) -> &str {
        &self.kv_separator
    }

    /// Whether map entries holding empty maps or lists are dropped.
    #[must_use]
    pub const fn prune_empty_containers(&self) -> bool {
        self.prune_empty_containers
    }

    /// Returns a copy with `sort_keys` set.
    #[must_use]
    pub fn with_sort_keys(self, sort_keys: bool) -> Self {
        Self { sort_keys, ..self }
    }

    /// Returns a copy with `ascii_escape` set.
    #[must_use]
    pub fn with_ascii_escape(self, ascii_escape: bool) -> Self {
        Self {
            ascii_escape,
            ..self
        }
    }

    /// Returns a copy with `escape_angle_bracket` set.
    #[must_use]
    pub fn with_escape_angle_bracket(self, escape_angle_bracket: bool) -> Self {
        Self {
            escape_angle_bracket,
            ..self
        }
    }

    /// Returns a copy with both separators replaced.
    #[must_use]
    pub fn with_separators(self, item: impl Into<String>, kv: impl Into<String>) -> Self {
        Self {
            item_separator: item.into(),
            kv_separator: kv.into(),
            ..self
        }
    }

    /// Returns a copy with `prune_empty_containers` set.
    #[must_use]
    pub fn with_prune_empty_containers(self, prune_empty_containers: bool) -> Self {
        Self {
            prune_empty_containers,
            ..self
        }
    }
}

impl fmt::Display for CanonicalizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        write!(
            f,
            "sort={} prune={} ascii={} lt={} sep=({:?}, {:?})",
            on_off(self.sort_keys),
            on_off(self.prune_empty_containers),
            on_off(self.ascii_escape),
            on_off(self.escape_angle_bracket),
            self.item_separator,
            self.kv_separator,
        )
    }
}
