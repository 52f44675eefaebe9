//! Keyed MACs over canonical preference strings.
//!
//! A per-path MAC is `HMAC-SHA256(secret, device_id || path || canonical)`.
//! The super-MAC is `HMAC-SHA256(secret, device_id || canonical(macs))`
//! where `macs` maps every protected path to its MAC.
//!
//! Tags render as 64 uppercase hex characters. Parsing accepts either case.
//! Comparison is constant-time.

mod tag;

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
pub use tag::{MAC_LEN, MacTag};

use crate::canonical::{CanonicalizationPolicy, canonicalize};
use crate::error::MalformedInput;
use crate::value::{DottedPath, PrefMap, PrefValue};

type HmacSha256 = Hmac<Sha256>;

/// Keying material for one store.
///
/// The secret is only exposed to the HMAC key schedule; `Debug` redacts it.
#[derive(Debug)]
pub struct MacContext {
    secret: SecretString,
    device_id: String,
}

impl MacContext {
    /// Creates a context. An empty secret and an empty device id are both
    /// legal; some stores use them.
    #[must_use]
    pub fn new(secret: SecretString, device_id: impl Into<String>) -> Self {
        Self {
            secret,
            device_id: device_id.into(),
        }
    }

    /// Device identifier prepended to every message.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// True if the secret is the empty string.
    #[must_use]
    pub fn has_empty_secret(&self) -> bool {
        self.secret.expose_secret().is_empty()
    }

    /// The secret as an HMAC block key: hashed when longer than a block,
    /// zero-padded otherwise.
    fn block_key(&self) -> Key<HmacSha256> {
        let secret = self.secret.expose_secret().as_bytes();
        let mut key = Key::<HmacSha256>::default();
        if secret.len() > key.len() {
            let digest = <Sha256 as sha2::Digest>::digest(secret);
            key[..digest.len()].copy_from_slice(&digest);
        } else {
            key[..secret.len()].copy_from_slice(secret);
        }
        key
    }

    fn sign(&self, parts: &[&str]) -> MacTag {
        let mut mac = <HmacSha256 as KeyInit>::new(&self.block_key());
        for part in parts {
            mac.update(part.as_bytes());
        }
        let mut bytes = [0u8; MAC_LEN];
        bytes.copy_from_slice(&mac.finalize().into_bytes());
        MacTag::from_bytes(bytes)
    }
}

/// MAC of one preference: `HMAC(secret, device_id || path || canonical)`.
///
/// `path` is taken as a plain string so callers can try reformatted or
/// empty paths.
#[must_use]
pub fn compute_mac(ctx: &MacContext, path: &str, canonical: &str) -> MacTag {
    ctx.sign(&[ctx.device_id(), path, canonical])
}

/// Super-MAC over a flat `{path: mac}` map.
///
/// Keys are the dotted paths verbatim. A path listed twice keeps its last
/// tag.
#[must_use]
pub fn compute_super_mac<'a, I>(ctx: &MacContext, records: I) -> MacTag
where
    I: IntoIterator<Item = (&'a DottedPath, &'a MacTag)>,
{
    let mut flat = std::collections::BTreeMap::new();
    for (path, tag) in records {
        flat.insert(path.as_str().to_owned(), PrefValue::String(tag.to_string()));
    }
    let map = PrefMap::from_unique_entries(flat.into_iter().collect());
    compute_super_mac_over(ctx, &PrefValue::Map(map))
}

/// Super-MAC over a map built the way the store persists it: each dotted
/// path expanded into nested maps.
///
/// # Errors
///
/// Returns [`MalformedInput::PathConflict`] if one path is both a leaf and
/// an ancestor of another, or is listed twice.
pub fn compute_nested_super_mac<'a, I>(
    ctx: &MacContext,
    records: I,
) -> Result<MacTag, MalformedInput>
where
    I: IntoIterator<Item = (&'a DottedPath, &'a MacTag)>,
{
    let mut root = PrefMap::new();
    for (path, tag) in records {
        insert_nested(&mut root, path, tag)?;
    }
    Ok(compute_super_mac_over(ctx, &PrefValue::Map(root)))
}

/// Super-MAC over an already nested MAC tree, such as the `protection.macs`
/// node of a snapshot.
#[must_use]
pub fn compute_super_mac_over(ctx: &MacContext, macs: &PrefValue) -> MacTag {
    let canonical = canonicalize(macs, &CanonicalizationPolicy::default());
    ctx.sign(&[ctx.device_id(), &canonical])
}

fn insert_nested(
    root: &mut PrefMap,
    path: &DottedPath,
    tag: &MacTag,
) -> Result<(), MalformedInput> {
    let conflict = || MalformedInput::PathConflict {
        path: path.to_string(),
    };
    let segments: Vec<&str> = path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(conflict());
    };

    let mut node = root;
    for segment in parents {
        if !node.contains_key(segment) {
            node.try_insert(*segment, PrefValue::Map(PrefMap::new()))?;
        }
        node = match node.get_mut(segment) {
            Some(PrefValue::Map(child)) => child,
            _ => return Err(conflict()),
        };
    }
    if node.contains_key(leaf) {
        return Err(conflict());
    }
    node.try_insert(*leaf, PrefValue::String(tag.to_string()))
}

/// Byte lengths of the pieces of a per-path MAC message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageBreakdown {
    /// Length of the device id.
    pub device_id_len: usize,
    /// Length of the path as used.
    pub path_len: usize,
    /// Length of the canonical string.
    pub canonical_len: usize,
    /// Sum of the three.
    pub message_len: usize,
}

impl MessageBreakdown {
    /// Measures the message `compute_mac` would sign.
    #[must_use]
    pub fn of(ctx: &MacContext, path: &str, canonical: &str) -> Self {
        let device_id_len = ctx.device_id().len();
        Self {
            device_id_len,
            path_len: path.len(),
            canonical_len: canonical.len(),
            message_len: device_id_len + path.len() + canonical.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(secret: &str, device_id: &str) -> MacContext {
        MacContext::new(SecretString::from(secret), device_id)
    }

    fn path(s: &str) -> DottedPath {
        DottedPath::parse(s).unwrap()
    }

    // =========================================================================
    // Per-path MAC
    // =========================================================================

    #[test]
    fn test_rfc4231_case_2_split_across_parts() {
        // Key "Jefe", data "what do ya want for nothing?".
        let tag = compute_mac(&ctx("Jefe", "what do ya "), "want for ", "nothing?");
        assert_eq!(
            tag.to_string(),
            "5BDCC146BF60754E6A042426089575C75A003F089D2739839DEC58B964EC3843"
        );
    }

    #[test]
    fn test_mac_is_deterministic() {
        let c = ctx("seed", "device");
        assert_eq!(compute_mac(&c, "a.b", "{}"), compute_mac(&c, "a.b", "{}"));
    }

    #[test]
    fn test_single_byte_sensitivity() {
        let base = compute_mac(&ctx("seed", "device"), "a.b", r#"{"x":1}"#);
        assert_ne!(base, compute_mac(&ctx("seee", "device"), "a.b", r#"{"x":1}"#));
        assert_ne!(base, compute_mac(&ctx("seed", "devicf"), "a.b", r#"{"x":1}"#));
        assert_ne!(base, compute_mac(&ctx("seed", "device"), "a.c", r#"{"x":1}"#));
        assert_ne!(base, compute_mac(&ctx("seed", "device"), "a.b", r#"{"x":2}"#));
    }

    #[test]
    fn test_empty_secret_is_usable() {
        let c = ctx("", "device");
        assert!(c.has_empty_secret());
        assert_eq!(compute_mac(&c, "p", "").to_string().len(), 64);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", ctx("hunter2", "device"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("device"));
    }

    #[test]
    fn test_breakdown() {
        let b = MessageBreakdown::of(&ctx("s", "D1"), "a.b", r#"{"x":1}"#);
        assert_eq!(b.device_id_len, 2);
        assert_eq!(b.path_len, 3);
        assert_eq!(b.canonical_len, 7);
        assert_eq!(b.message_len, 12);
    }

    #[test]
    fn test_block_key_matches_hmac_key_schedule() {
        // Shorter than, equal to, and longer than the 64-byte block.
        for len in [0, 5, 64, 131] {
            let secret = "k".repeat(len);
            let mut reference = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).unwrap();
            reference.update(b"devicepathvalue");
            let expected = hex::encode_upper(reference.finalize().into_bytes());
            let tag = compute_mac(&ctx(&secret, "device"), "path", "value");
            assert_eq!(tag.to_string(), expected, "secret length {len}");
        }
    }

    // =========================================================================
    // Super-MAC
    // =========================================================================

    #[test]
    fn test_super_mac_order_independent() {
        let c = ctx("seed", "device");
        let (p1, p2) = (path("b.x"), path("a.y"));
        let (t1, t2) = (compute_mac(&c, "b.x", "1"), compute_mac(&c, "a.y", "2"));
        let forward = compute_super_mac(&c, [(&p1, &t1), (&p2, &t2)]);
        let reverse = compute_super_mac(&c, [(&p2, &t2), (&p1, &t1)]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_super_mac_signs_sorted_flat_map() {
        let c = ctx("seed", "device");
        let p = path("a.b");
        let t = compute_mac(&c, "a.b", "1");
        let expected_canonical = format!(r#"{{"a.b":"{t}"}}"#);
        assert_eq!(
            compute_super_mac(&c, [(&p, &t)]),
            compute_mac(&c, "", &expected_canonical)
        );
    }

    #[test]
    fn test_nested_super_mac_matches_tree() {
        let c = ctx("seed", "device");
        let (p1, p2) = (path("extensions.settings.abc"), path("homepage"));
        let (t1, t2) = (compute_mac(&c, "x", "1"), compute_mac(&c, "y", "2"));
        let tree = PrefValue::from_json_str(&format!(
            r#"{{"homepage": "{t2}", "extensions": {{"settings": {{"abc": "{t1}"}}}}}}"#
        ))
        .unwrap();
        assert_eq!(
            compute_nested_super_mac(&c, [(&p1, &t1), (&p2, &t2)]).unwrap(),
            compute_super_mac_over(&c, &tree)
        );
        assert_ne!(
            compute_super_mac(&c, [(&p1, &t1), (&p2, &t2)]),
            compute_super_mac_over(&c, &tree)
        );
    }

    #[test]
    fn test_super_mac_detects_inserted_and_removed_records() {
        let c = ctx("seed", "device");
        let paths = [path("homepage"), path("extensions.settings.abc"), path("session.restore")];
        let tags: Vec<MacTag> = paths
            .iter()
            .map(|p| compute_mac(&c, p.as_str(), "1"))
            .collect();
        let table: Vec<(&DottedPath, &MacTag)> = paths.iter().zip(&tags).collect();

        let (full, without_last) = (&table[..], &table[..2]);
        assert_ne!(
            compute_super_mac(&c, without_last.iter().copied()),
            compute_super_mac(&c, full.iter().copied())
        );
        assert_ne!(
            compute_nested_super_mac(&c, without_last.iter().copied()).unwrap(),
            compute_nested_super_mac(&c, full.iter().copied()).unwrap()
        );

        // Dropping a record from the middle.
        let gapped = [table[0], table[2]];
        assert_ne!(
            compute_super_mac(&c, gapped),
            compute_super_mac(&c, full.iter().copied())
        );
        assert_ne!(
            compute_nested_super_mac(&c, gapped).unwrap(),
            compute_nested_super_mac(&c, full.iter().copied()).unwrap()
        );
    }

    #[test]
    fn test_nested_super_mac_rejects_leaf_prefix_conflict() {
        let c = ctx("seed", "device");
        let (p1, p2) = (path("a"), path("a.b"));
        let t = compute_mac(&c, "a", "1");
        for records in [[(&p1, &t), (&p2, &t)], [(&p2, &t), (&p1, &t)]] {
            assert_eq!(
                compute_nested_super_mac(&c, records),
                Err(MalformedInput::PathConflict {
                    path: records[1].0.to_string()
                })
            );
        }
    }
}
