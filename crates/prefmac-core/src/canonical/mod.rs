//! Canonicalization of preference values.
//!
//! [`canonicalize`] turns a [`PrefValue`] into the exact string the target
//! scheme feeds into its MAC. The output is a pure function of the value and
//! the [`CanonicalizationPolicy`].
//!
//! # Rules
//!
//! 1. With `prune_empty_containers`, map entries whose value is an empty map
//!    or empty list are dropped, bottom-up. List elements are never dropped.
//! 2. With `sort_keys`, map keys are emitted in byte order; otherwise in
//!    source order. Lists always keep their order.
//! 3. A top-level null, bool or number is returned in display form (`""`,
//!    `true`, `false`, the decimal number). Strings are quoted and escaped.
//!    Lists and maps use the compact encoding with the policy's separators.
//!
//! # Example
//!
//! ```
//! use prefmac_core::canonical::{CanonicalizationPolicy, canonicalize};
//! use prefmac_core::value::PrefValue;
//!
//! let value = PrefValue::from_json_str(r#"{"y": [], "x": 1}"#).unwrap();
//! let canonical = canonicalize(&value, &CanonicalizationPolicy::default());
//! assert_eq!(canonical, r#"{"x":1}"#);
//! ```

mod key_order;
mod policy;

use std::borrow::Cow;
use std::fmt::Write as _;

pub use key_order::{KeyDivergence, KeyOrderAnalysis};
pub use policy::{CanonicalizationPolicy, DEFAULT_ITEM_SEPARATOR, DEFAULT_KV_SEPARATOR};

use crate::value::{PrefMap, PrefValue};

/// Canonicalizes `value` under `policy`.
///
/// Total and deterministic: every value has exactly one canonical string per
/// policy.
#[must_use]
pub fn canonicalize(value: &PrefValue, policy: &CanonicalizationPolicy) -> String {
    let value = if policy.prune_empty_containers() {
        Cow::Owned(prune_empty(value))
    } else {
        Cow::Borrowed(value)
    };

    match &*value {
        PrefValue::Null => String::new(),
        PrefValue::Bool(b) => b.to_string(),
        PrefValue::Number(n) => n.to_string(),
        composite @ (PrefValue::String(_) | PrefValue::List(_) | PrefValue::Map(_)) => {
            let mut output = String::new();
            Emitter { policy }.emit_value(composite, &mut output);
            output
        },
    }
}

/// Drops map entries that hold an empty map or empty list, bottom-up.
///
/// A map that becomes empty after its own children are pruned is itself
/// eligible for removal by its parent. List elements are kept even when
/// they are empty containers; maps nested inside lists are still pruned
/// internally. The root is never dropped.
#[must_use]
pub fn prune_empty(value: &PrefValue) -> PrefValue {
    match value {
        PrefValue::List(items) => PrefValue::List(items.iter().map(prune_empty).collect()),
        PrefValue::Map(map) => {
            let entries = map
                .iter()
                .filter_map(|(key, child)| {
                    let pruned = prune_empty(child);
                    (!pruned.is_empty_container()).then(|| (key.to_owned(), pruned))
                })
                .collect();
            PrefValue::Map(PrefMap::from_unique_entries(entries))
        },
        leaf => leaf.clone(),
    }
}

/// Compact JSON in source order with nothing pruned. Scalars use their JSON
/// form (`null`, not `""`).
pub(crate) fn to_json_string(value: &PrefValue) -> String {
    let policy = CanonicalizationPolicy::source_order();
    let mut output = String::new();
    Emitter { policy: &policy }.emit_value(value, &mut output);
    output
}

struct Emitter<'p> {
    policy: &'p CanonicalizationPolicy,
}

impl Emitter<'_> {
    fn emit_value(&self, value: &PrefValue, output: &mut String) {
        match value {
            PrefValue::Null => output.push_str("null"),
            PrefValue::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
            PrefValue::Number(n) => {
                let _ = write!(output, "{n}");
            },
            PrefValue::String(s) => self.emit_string(s, output),
            PrefValue::List(items) => self.emit_list(items, output),
            PrefValue::Map(map) => self.emit_map(map, output),
        }
    }

    /// Quote, backslash and U+0000..=U+001F are always escaped. Non-ASCII and
    /// `<` are escaped only when the policy asks for it.
    fn emit_string(&self, s: &str, output: &mut String) {
        output.push('"');
        for c in s.chars() {
            match c {
                '"' => output.push_str("\\\""),
                '\\' => output.push_str("\\\\"),
                '\u{0008}' => output.push_str("\\b"),
                '\u{000C}' => output.push_str("\\f"),
                '\n' => output.push_str("\\n"),
                '\r' => output.push_str("\\r"),
                '\t' => output.push_str("\\t"),
                c if c <= '\u{001F}' => {
                    let _ = write!(output, "\\u{:04x}", u32::from(c));
                },
                '<' if self.policy.escape_angle_bracket() => {
                    let _ = write!(output, "\\u{:04X}", u32::from(c));
                },
                c if !c.is_ascii() && self.policy.ascii_escape() => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        let _ = write!(output, "\\u{unit:04x}");
                    }
                },
                c => output.push(c),
            }
        }
        output.push('"');
    }

    fn emit_list(&self, items: &[PrefValue], output: &mut String) {
        output.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                output.push_str(self.policy.item_separator());
            }
            self.emit_value(item, output);
        }
        output.push(']');
    }

    fn emit_map(&self, map: &PrefMap, output: &mut String) {
        let mut entries: Vec<(&str, &PrefValue)> = map.iter().collect();
        if self.policy.sort_keys() {
            // `str` ordering is byte-wise.
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        }

        output.push('{');
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                output.push_str(self.policy.item_separator());
            }
            self.emit_string(key, output);
            output.push_str(self.policy.kv_separator());
            self.emit_value(value, output);
        }
        output.push('}');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> PrefValue {
        PrefValue::from_json_str(input).unwrap()
    }

    fn default_policy() -> CanonicalizationPolicy {
        CanonicalizationPolicy::default()
    }

    fn all_flag_policies() -> Vec<CanonicalizationPolicy> {
        let mut out = Vec::new();
        for sort in [true, false] {
            for prune in [true, false] {
                for ascii in [true, false] {
                    for lt in [true, false] {
                        for (item, kv) in [(",", ":"), (", ", ": ")] {
                            out.push(
                                CanonicalizationPolicy::default()
                                    .with_sort_keys(sort)
                                    .with_prune_empty_containers(prune)
                                    .with_ascii_escape(ascii)
                                    .with_escape_angle_bracket(lt)
                                    .with_separators(item, kv),
                            );
                        }
                    }
                }
            }
        }
        out
    }

    // =========================================================================
    // Top-level leaf rules
    // =========================================================================

    #[test]
    fn test_leaf_bypass_for_every_policy() {
        for policy in all_flag_policies() {
            assert_eq!(canonicalize(&PrefValue::Null, &policy), "");
            assert_eq!(canonicalize(&PrefValue::Bool(true), &policy), "true");
            assert_eq!(canonicalize(&PrefValue::Bool(false), &policy), "false");
            assert_eq!(canonicalize(&PrefValue::from(42), &policy), "42");
        }
    }

    #[test]
    fn test_top_level_string_is_quoted() {
        assert_eq!(
            canonicalize(&PrefValue::from("say \"hi\""), &default_policy()),
            r#""say \"hi\"""#
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(canonicalize(&parse("-7"), &default_policy()), "-7");
        assert_eq!(canonicalize(&parse("1.5"), &default_policy()), "1.5");
        assert_eq!(
            canonicalize(&parse("13188169127141243"), &default_policy()),
            "13188169127141243"
        );
    }

    #[test]
    fn test_nested_null_uses_json_form() {
        assert_eq!(
            canonicalize(&parse(r#"{"a": null}"#), &default_policy()),
            r#"{"a":null}"#
        );
    }

    // =========================================================================
    // Empty containers
    // =========================================================================

    #[test]
    fn test_empty_list_is_brackets() {
        for policy in all_flag_policies() {
            assert_eq!(canonicalize(&parse("[]"), &policy), "[]");
        }
    }

    #[test]
    fn test_top_level_empty_map() {
        assert_eq!(canonicalize(&parse("{}"), &default_policy()), "{}");
    }

    #[test]
    fn test_map_that_prunes_to_empty_stays_at_root() {
        assert_eq!(
            canonicalize(&parse(r#"{"a": [], "b": {}}"#), &default_policy()),
            "{}"
        );
    }

    // =========================================================================
    // Pruning
    // =========================================================================

    #[test]
    fn test_prune_drops_empty_list_entry() {
        assert_eq!(
            canonicalize(&parse(r#"{"x": 1, "y": []}"#), &default_policy()),
            r#"{"x":1}"#
        );
    }

    #[test]
    fn test_prune_keeps_empty_map_in_list() {
        assert_eq!(
            canonicalize(&parse(r#"{"l": [{}, []]}"#), &default_policy()),
            r#"{"l":[{},[]]}"#
        );
    }

    #[test]
    fn test_prune_is_bottom_up() {
        let value = parse(r#"{"keep": 1, "outer": {"inner": {"empty": []}}}"#);
        assert_eq!(canonicalize(&value, &default_policy()), r#"{"keep":1}"#);
    }

    #[test]
    fn test_prune_inside_list_elements() {
        let value = parse(r#"[{"a": [], "b": 2}]"#);
        assert_eq!(canonicalize(&value, &default_policy()), r#"[{"b":2}]"#);
    }

    #[test]
    fn test_no_prune_keeps_everything() {
        let policy = default_policy().with_prune_empty_containers(false);
        assert_eq!(
            canonicalize(&parse(r#"{"x": 1, "y": []}"#), &policy),
            r#"{"x":1,"y":[]}"#
        );
    }

    #[test]
    fn test_prune_does_not_drop_null_or_empty_string() {
        assert_eq!(
            canonicalize(&parse(r#"{"n": null, "s": ""}"#), &default_policy()),
            r#"{"n":null,"s":""}"#
        );
    }

    // =========================================================================
    // Key order
    // =========================================================================

    #[test]
    fn test_sort_keys_equalizes_permutations() {
        let a = parse(r#"{"a": 1, "b": 2}"#);
        let b = parse(r#"{"b": 2, "a": 1}"#);
        assert_eq!(
            canonicalize(&a, &default_policy()),
            canonicalize(&b, &default_policy())
        );

        let unsorted = default_policy().with_sort_keys(false);
        assert_ne!(canonicalize(&a, &unsorted), canonicalize(&b, &unsorted));
        assert_eq!(canonicalize(&b, &unsorted), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn test_sort_is_recursive_and_byte_wise() {
        let value = parse(r#"{"b": {"z": 1, "Z": 2}, "a": [{"y": 1, "x": 2}]}"#);
        assert_eq!(
            canonicalize(&value, &default_policy()),
            r#"{"a":[{"x":2,"y":1}],"b":{"Z":2,"z":1}}"#
        );
    }

    #[test]
    fn test_list_order_preserved() {
        assert_eq!(canonicalize(&parse("[3, 1, 2]"), &default_policy()), "[3,1,2]");
    }

    // =========================================================================
    // Separators and escaping
    // =========================================================================

    #[test]
    fn test_spaced_separators() {
        let policy = default_policy().with_separators(", ", ": ");
        assert_eq!(
            canonicalize(&parse(r#"{"a": [1, 2], "b": true}"#), &policy),
            r#"{"a": [1, 2], "b": true}"#
        );
    }

    #[test]
    fn test_control_characters_always_escaped() {
        let value = PrefValue::from("line1\nline2\ttab\u{0001}");
        assert_eq!(
            canonicalize(&value, &default_policy()),
            r#""line1\nline2\ttab\u0001""#
        );
    }

    #[test]
    fn test_ascii_escape() {
        let value = PrefValue::from("caf\u{e9} \u{1F600}");
        assert_eq!(canonicalize(&value, &default_policy()), "\"caf\u{e9} \u{1F600}\"");
        assert_eq!(
            canonicalize(&value, &default_policy().with_ascii_escape(true)),
            r#""caf\u00e9 \ud83d\ude00""#
        );
    }

    #[test]
    fn test_angle_bracket_escape() {
        let value = parse(r#"{"explicit_host": ["<all_urls>"]}"#);
        assert_eq!(
            canonicalize(&value, &default_policy()),
            r#"{"explicit_host":["<all_urls>"]}"#
        );
        assert_eq!(
            canonicalize(&value, &default_policy().with_escape_angle_bracket(true)),
            r#"{"explicit_host":["\u003Call_urls>"]}"#
        );
    }

    #[test]
    fn test_keys_are_escaped_like_strings() {
        let value = parse(r#"{"a\"b": 1}"#);
        assert_eq!(canonicalize(&value, &default_policy()), r#"{"a\"b":1}"#);
    }

    #[test]
    fn test_display_uses_source_order_json() {
        let value = parse(r#"{"b": null, "a": []}"#);
        assert_eq!(value.to_string(), r#"{"b":null,"a":[]}"#);
    }
}
