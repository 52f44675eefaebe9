//! Ground-truth capture files.
//!
//! A capture is a JSON object recorded from a running instance:
//!
//! ```json
//! {
//!   "_description": "free text, ignored",
//!   "device_id": "S-1-5-21-...",
//!   "file_mac_seed": "",
//!   "registry_mac_seed": "ChromeRegistryHashStoreValidationSeed",
//!   "super_mac_seed": "",
//!   "file_macs": { "extensions.settings.<id>": "A1B2..." },
//!   "registry_macs": { "homepage": "C3D4..." },
//!   "super_mac": "E5F6..."
//! }
//! ```
//!
//! `super_mac_seed` defaults to `file_mac_seed`. Keys starting with `_` are
//! annotations, both at the top level and inside the MAC tables. MAC tables
//! keep their file order.

use std::path::Path;

use anyhow::{Context, Result, bail};
use prefmac_core::{DottedPath, ExpectedMac, MacContext, MacTag, PrefMap, PrefValue, StoreKind};
use secrecy::{ExposeSecret, SecretString};

/// A parsed capture file.
#[derive(Debug)]
pub struct Capture {
    pub device_id: String,
    pub file_mac_seed: SecretString,
    pub registry_mac_seed: SecretString,
    pub super_mac_seed: SecretString,
    pub file_macs: Vec<(DottedPath, MacTag)>,
    pub registry_macs: Vec<(DottedPath, MacTag)>,
    pub super_mac: Option<MacTag>,
}

impl Capture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read capture {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("invalid capture {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let root = PrefValue::from_json_str(text)?;
        let Some(map) = root.as_map() else {
            bail!("capture must be a JSON object, found {}", root.kind());
        };

        let device_id = required_str(map, "device_id")?;
        let file_mac_seed = required_str(map, "file_mac_seed")?;
        let registry_mac_seed = optional_str(map, "registry_mac_seed")?.unwrap_or_default();
        let super_mac_seed =
            optional_str(map, "super_mac_seed")?.unwrap_or_else(|| file_mac_seed.clone());
        let super_mac = optional_str(map, "super_mac")?
            .map(|s| MacTag::parse(&s))
            .transpose()
            .context("invalid super_mac")?;

        Ok(Self {
            device_id,
            file_mac_seed: SecretString::from(file_mac_seed),
            registry_mac_seed: SecretString::from(registry_mac_seed),
            super_mac_seed: SecretString::from(super_mac_seed),
            file_macs: mac_table(map, "file_macs")?,
            registry_macs: mac_table(map, "registry_macs")?,
            super_mac,
        })
    }

    /// Keying material for `store`.
    pub fn context(&self, store: StoreKind) -> MacContext {
        let seed = match store {
            StoreKind::File => &self.file_mac_seed,
            StoreKind::Registry => &self.registry_mac_seed,
        };
        self.keyed_by(seed)
    }

    /// Keying material for the super-MAC.
    pub fn super_mac_context(&self) -> MacContext {
        self.keyed_by(&self.super_mac_seed)
    }

    fn keyed_by(&self, seed: &SecretString) -> MacContext {
        MacContext::new(
            SecretString::from(seed.expose_secret()),
            self.device_id.as_str(),
        )
    }

    /// Every stored MAC whose path contains `filter`, file store first.
    pub fn expected(&self, filter: Option<&str>) -> Vec<ExpectedMac> {
        let file = self.file_macs.iter().map(|entry| (StoreKind::File, entry));
        let registry = self
            .registry_macs
            .iter()
            .map(|entry| (StoreKind::Registry, entry));
        file.chain(registry)
            .filter(|(_, (path, _))| filter.is_none_or(|f| path.as_str().contains(f)))
            .map(|(store, (path, tag))| ExpectedMac {
                store,
                path: path.clone(),
                expected_mac: *tag,
            })
            .collect()
    }
}

fn optional_str(map: &PrefMap, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(PrefValue::Null) => Ok(None),
        Some(PrefValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("`{key}` must be a string, found {}", other.kind()),
    }
}

fn required_str(map: &PrefMap, key: &str) -> Result<String> {
    optional_str(map, key)?.with_context(|| format!("missing `{key}`"))
}

fn mac_table(map: &PrefMap, key: &str) -> Result<Vec<(DottedPath, MacTag)>> {
    let Some(value) = map.get(key) else {
        return Ok(Vec::new());
    };
    let Some(table) = value.as_map() else {
        bail!("`{key}` must be an object, found {}", value.kind());
    };

    let mut out = Vec::with_capacity(table.len());
    for (path, tag) in table.iter().filter(|(path, _)| !path.starts_with('_')) {
        let Some(tag) = tag.as_str() else {
            bail!("`{key}.{path}` must be a string, found {}", tag.kind());
        };
        let path = DottedPath::parse(path).with_context(|| format!("bad path in `{key}`"))?;
        let tag = MacTag::parse(tag).with_context(|| format!("bad MAC for `{path}`"))?;
        out.push((path, tag));
    }
    Ok(out)
}
