//! The declared hypothesis space and its mixed-radix decoding.
//!
//! A candidate index decodes as
//! `index = (path * transforms + transform) * policies + policy`, so the
//! path variant changes slowest and the policy fastest. Within the policy
//! digit, `sort_keys` is least significant, followed by
//! `prune_empty_containers`, `ascii_escape`, `escape_angle_bracket` and the
//! separator pair. Index 0 is always the unmodified value under the
//! baseline policy and the path as written.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::canonical::CanonicalizationPolicy;
use crate::config::SearchConfig;
use crate::value::{DottedPath, PrefMap, PrefValue};

/// How the preference path is written into the MAC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathVariant {
    /// The dotted path unchanged.
    AsIs,
    /// Segments joined with `/` instead of `.`.
    SlashSeparated,
    /// No path at all.
    Empty,
}

impl PathVariant {
    /// Renders `path` in this variant.
    #[must_use]
    pub fn apply(self, path: &DottedPath) -> String {
        match self {
            Self::AsIs => path.as_str().to_string(),
            Self::SlashSeparated => path.segments().collect::<Vec<_>>().join("/"),
            Self::Empty => String::new(),
        }
    }
}

impl fmt::Display for PathVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AsIs => "path as-is",
            Self::SlashSeparated => "slash-separated path",
            Self::Empty => "empty path",
        })
    }
}

/// Rewrite applied to backslashes in a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    /// `\` becomes `/`.
    ForwardSlash,
    /// `\` becomes `\\`.
    DoubledBackslash,
}

impl SeparatorStyle {
    fn rewrite(self, s: &str) -> String {
        match self {
            Self::ForwardSlash => s.replace('\\', "/"),
            Self::DoubledBackslash => s.replace('\\', "\\\\"),
        }
    }
}

/// A rewrite of the value before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueTransform {
    /// The value as captured.
    Identity,
    /// One top-level key removed.
    DropKey {
        /// Removed key.
        key: String,
    },
    /// Several top-level keys removed.
    DropKeys {
        /// Removed keys, all present in the value.
        keys: Vec<String>,
    },
    /// Only the listed top-level keys kept.
    RestrictToKeys {
        /// Kept keys, all present in the value.
        keys: Vec<String>,
    },
    /// Backslashes in one top-level string field rewritten.
    RewriteStringField {
        /// Field name.
        field: String,
        /// Replacement style.
        style: SeparatorStyle,
    },
}

impl ValueTransform {
    /// Applies the transform. Anything other than `Identity` only affects
    /// maps; other values pass through unchanged.
    #[must_use]
    pub fn apply<'v>(&self, value: &'v PrefValue) -> Cow<'v, PrefValue> {
        let Some(map) = value.as_map() else {
            return Cow::Borrowed(value);
        };
        let filtered = |keep: &dyn Fn(&str) -> bool| {
            let mut out = map.clone();
            out.retain(|k, _| keep(k));
            Cow::Owned(PrefValue::Map(out))
        };
        match self {
            Self::Identity => Cow::Borrowed(value),
            Self::DropKey { key } => filtered(&|k: &str| k != key),
            Self::DropKeys { keys } => filtered(&|k: &str| !keys.iter().any(|d| d == k)),
            Self::RestrictToKeys { keys } => filtered(&|k: &str| keys.iter().any(|d| d == k)),
            Self::RewriteStringField { field, style } => {
                let mut out = map.clone();
                if let Some(PrefValue::String(s)) = out.get_mut(field) {
                    *s = style.rewrite(s);
                }
                Cow::Owned(PrefValue::Map(out))
            },
        }
    }
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("identity"),
            Self::DropKey { key } => write!(f, "drop key {key:?}"),
            Self::DropKeys { keys } => write!(f, "drop keys {keys:?}"),
            Self::RestrictToKeys { keys } => write!(f, "keep only {keys:?}"),
            Self::RewriteStringField { field, style } => {
                let style = match style {
                    SeparatorStyle::ForwardSlash => "forward slashes",
                    SeparatorStyle::DoubledBackslash => "doubled backslashes",
                };
                write!(f, "rewrite {field:?} with {style}")
            },
        }
    }
}

/// One point in the search space.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'s> {
    /// Position in enumeration order.
    pub index: usize,
    /// Path rendering.
    pub path_variant: PathVariant,
    /// Index into [`SearchSpace::transforms`].
    pub transform_index: usize,
    /// Value rewrite.
    pub transform: &'s ValueTransform,
    /// Policy to canonicalize with.
    pub policy: &'s CanonicalizationPolicy,
}

/// The full hypothesis table for one record.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    paths: Vec<PathVariant>,
    transforms: Vec<ValueTransform>,
    policies: Vec<CanonicalizationPolicy>,
}

impl SearchSpace {
    /// Builds the space for `value` at `path`.
    ///
    /// `baseline` supplies index 0 of every policy axis; the other values of
    /// each boolean axis and the remaining configured separator pairs follow.
    #[must_use]
    pub fn for_record(
        config: &SearchConfig,
        baseline: &CanonicalizationPolicy,
        path: &DottedPath,
        value: &PrefValue,
    ) -> Self {
        let mut paths = vec![PathVariant::AsIs];
        if path.segments().nth(1).is_some() {
            paths.push(PathVariant::SlashSeparated);
        }
        paths.push(PathVariant::Empty);

        Self {
            paths,
            transforms: transforms_for(config, value),
            policies: policies_for(config, baseline),
        }
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len() * self.transforms.len() * self.policies.len()
    }

    /// Always false; every space holds at least the baseline candidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value transforms in enumeration order.
    #[must_use]
    pub fn transforms(&self) -> &[ValueTransform] {
        &self.transforms
    }

    /// Policies in enumeration order.
    #[must_use]
    pub fn policies(&self) -> &[CanonicalizationPolicy] {
        &self.policies
    }

    /// Decodes a candidate index.
    #[must_use]
    pub fn candidate(&self, index: usize) -> Option<Candidate<'_>> {
        if index >= self.len() {
            return None;
        }
        let policy_index = index % self.policies.len();
        let rest = index / self.policies.len();
        let transform_index = rest % self.transforms.len();
        let path_index = rest / self.transforms.len();
        Some(Candidate {
            index,
            path_variant: self.paths[path_index],
            transform_index,
            transform: &self.transforms[transform_index],
            policy: &self.policies[policy_index],
        })
    }
}

fn policies_for(
    config: &SearchConfig,
    baseline: &CanonicalizationPolicy,
) -> Vec<CanonicalizationPolicy> {
    let baseline_pair = (
        baseline.item_separator().to_string(),
        baseline.kv_separator().to_string(),
    );
    let mut separators = vec![baseline_pair.clone()];
    separators.extend(
        config
            .separators
            .iter()
            .filter(|pair| **pair != baseline_pair)
            .cloned(),
    );

    let flip = |default: bool| [default, !default];
    let mut policies = Vec::with_capacity(16 * separators.len());
    for (item, kv) in &separators {
        for lt in flip(baseline.escape_angle_bracket()) {
            for ascii in flip(baseline.ascii_escape()) {
                for prune in flip(baseline.prune_empty_containers()) {
                    for sort in flip(baseline.sort_keys()) {
                        policies.push(
                            baseline
                                .clone()
                                .with_sort_keys(sort)
                                .with_prune_empty_containers(prune)
                                .with_ascii_escape(ascii)
                                .with_escape_angle_bracket(lt)
                                .with_separators(item.as_str(), kv.as_str()),
                        );
                    }
                }
            }
        }
    }
    policies
}

fn transforms_for(config: &SearchConfig, value: &PrefValue) -> Vec<ValueTransform> {
    let mut transforms = vec![ValueTransform::Identity];
    let Some(map) = value.as_map() else {
        return transforms;
    };

    let mut present: Vec<&str> = map.keys().collect();
    present.sort_unstable();

    transforms.extend(present.iter().map(|key| ValueTransform::DropKey {
        key: (*key).to_string(),
    }));

    for set in &config.drop_key_sets {
        let keys = present_subset(map, set);
        // A single key is already covered by `DropKey`.
        if keys.len() > 1 {
            push_unique(&mut transforms, ValueTransform::DropKeys { keys });
        }
    }

    let core = present_subset(map, &config.core_keys);
    if !core.is_empty() {
        if core.len() < present.len() {
            push_unique(
                &mut transforms,
                ValueTransform::RestrictToKeys { keys: core.clone() },
            );
        }
        for extra in present.iter().filter(|k| !core.iter().any(|c| c == *k)) {
            let mut keys = core.clone();
            keys.push((*extra).to_string());
            keys.sort_unstable();
            if keys.len() < present.len() {
                push_unique(&mut transforms, ValueTransform::RestrictToKeys { keys });
            }
        }
    }

    if let Some(PrefValue::String(s)) = map.get(&config.string_field) {
        if s.contains('\\') {
            for style in [SeparatorStyle::ForwardSlash, SeparatorStyle::DoubledBackslash] {
                transforms.push(ValueTransform::RewriteStringField {
                    field: config.string_field.clone(),
                    style,
                });
            }
        }
    }

    transforms
}

/// Keys of `wanted` present in `map`, sorted and deduplicated.
fn present_subset(map: &PrefMap, wanted: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = wanted
        .iter()
        .filter(|k| map.contains_key(k))
        .cloned()
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

fn push_unique(transforms: &mut Vec<ValueTransform>, transform: ValueTransform) {
    if !transforms.contains(&transform) {
        transforms.push(transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extension_value() -> PrefValue {
        PrefValue::from_json_str(
            r#"{
                "path": "C:\\ext\\1.0",
                "location": 4,
                "state": 1,
                "commands": {},
                "events": [],
                "granted_permissions": {"api": ["tabs"]}
            }"#,
        )
        .unwrap()
    }

    fn space_for(path: &str, value: &PrefValue) -> SearchSpace {
        SearchSpace::for_record(
            &SearchConfig::default(),
            &CanonicalizationPolicy::default(),
            &DottedPath::parse(path).unwrap(),
            value,
        )
    }

    #[test]
    fn test_index_zero_is_baseline() {
        let space = space_for("a.b", &extension_value());
        let first = space.candidate(0).unwrap();
        assert_eq!(first.path_variant, PathVariant::AsIs);
        assert_eq!(*first.transform, ValueTransform::Identity);
        assert_eq!(*first.policy, CanonicalizationPolicy::default());
    }

    #[test]
    fn test_policy_axis_is_innermost() {
        let space = space_for("a.b", &extension_value());
        let second = space.candidate(1).unwrap();
        assert_eq!(*second.transform, ValueTransform::Identity);
        assert!(!second.policy.sort_keys());
        let next_transform = space.candidate(space.policies().len()).unwrap();
        assert_eq!(next_transform.policy, space.candidate(0).unwrap().policy);
        assert_ne!(*next_transform.transform, ValueTransform::Identity);
    }

    #[test]
    fn test_decode_covers_every_index_once() {
        let space = space_for("a.b", &extension_value());
        assert_eq!(space.policies().len(), 16 * 4);
        assert!(space.candidate(space.len()).is_none());
        let last = space.candidate(space.len() - 1).unwrap();
        assert_eq!(last.path_variant, PathVariant::Empty);
        assert_eq!(last.transform_index, space.transforms().len() - 1);
    }

    #[test]
    fn test_single_segment_path_has_no_slash_variant() {
        let value = PrefValue::from("x");
        let space = space_for("homepage", &value);
        assert_eq!(space.len(), 2 * space.policies().len());
        assert_eq!(space.transforms(), &[ValueTransform::Identity]);
    }

    #[test]
    fn test_transforms_for_extension_entry() {
        let space = space_for("a.b", &extension_value());
        let transforms = space.transforms();

        assert!(transforms.contains(&ValueTransform::DropKey {
            key: "granted_permissions".into()
        }));
        assert!(transforms.contains(&ValueTransform::DropKeys {
            keys: vec!["commands".into(), "events".into()]
        }));
        assert!(transforms.contains(&ValueTransform::DropKeys {
            keys: vec!["commands".into(), "events".into(), "state".into()]
        }));
        assert!(transforms.contains(&ValueTransform::RestrictToKeys {
            keys: vec!["location".into(), "path".into()]
        }));
        assert!(transforms.contains(&ValueTransform::RestrictToKeys {
            keys: vec!["location".into(), "path".into(), "state".into()]
        }));
        assert!(transforms.contains(&ValueTransform::RewriteStringField {
            field: "path".into(),
            style: SeparatorStyle::ForwardSlash,
        }));
    }

    #[test]
    fn test_apply_rewrites() {
        let value = extension_value();
        let slash = ValueTransform::RewriteStringField {
            field: "path".into(),
            style: SeparatorStyle::ForwardSlash,
        };
        let rewritten = slash.apply(&value);
        assert_eq!(
            rewritten.as_map().unwrap().get("path"),
            Some(&PrefValue::from("C:/ext/1.0"))
        );

        let doubled = ValueTransform::RewriteStringField {
            field: "path".into(),
            style: SeparatorStyle::DoubledBackslash,
        };
        assert_eq!(
            doubled.apply(&value).as_map().unwrap().get("path"),
            Some(&PrefValue::from("C:\\\\ext\\\\1.0"))
        );

        let restricted = ValueTransform::RestrictToKeys {
            keys: vec!["state".into()],
        }
        .apply(&value);
        assert_eq!(restricted.as_map().unwrap().keys().collect::<Vec<_>>(), ["state"]);
    }

    #[test]
    fn test_apply_ignores_non_maps() {
        let value = PrefValue::from("x");
        let drop = ValueTransform::DropKey { key: "x".into() };
        assert!(matches!(drop.apply(&value), Cow::Borrowed(_)));
    }

    #[test]
    fn test_path_variants() {
        let path = DottedPath::parse("extensions.settings.abc").unwrap();
        assert_eq!(PathVariant::AsIs.apply(&path), "extensions.settings.abc");
        assert_eq!(PathVariant::SlashSeparated.apply(&path), "extensions/settings/abc");
        assert_eq!(PathVariant::Empty.apply(&path), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ValueTransform::DropKey { key: "state".into() }.to_string(),
            r#"drop key "state""#
        );
        assert_eq!(PathVariant::Empty.to_string(), "empty path");
    }
}
