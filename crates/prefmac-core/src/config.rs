//! Configuration loading.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! [policy]
//! sort_keys = true
//! prune_empty_containers = true
//!
//! [search]
//! parallelism = 0
//! max_near_misses = 5
//! separators = [[",", ":"], [", ", ": "]]
//!
//! [report]
//! max_failures = 3
//! excerpt_len = 200
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canonical::{CanonicalizationPolicy, DEFAULT_ITEM_SEPARATOR, DEFAULT_KV_SEPARATOR};

/// Upper bound on search worker threads.
pub const MAX_PARALLELISM: usize = 64;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefmacConfig {
    /// Policy used by `verify` and as the search baseline.
    #[serde(default)]
    pub policy: CanonicalizationPolicy,

    /// Hypothesis search space and limits.
    #[serde(default)]
    pub search: SearchConfig,

    /// Batch report limits.
    #[serde(default)]
    pub report: ReportConfig,
}

impl PrefmacConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a separator pair is empty.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        if config.search.separators.is_empty() {
            return Err(ConfigError::Validation(
                "search.separators must list at least one pair".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Search space and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Worker threads; `0` uses the available parallelism.
    pub parallelism: usize,

    /// Near-misses kept when the search is exhausted.
    pub max_near_misses: usize,

    /// `(item, kv)` separator pairs, default pair first.
    pub separators: Vec<(String, String)>,

    /// Key sets that may have been excluded from the MAC as runtime-only
    /// state.
    pub drop_key_sets: Vec<Vec<String>>,

    /// Keys that identify an entry; tried alone and with one extra key.
    pub core_keys: Vec<String>,

    /// String field whose path separators are rewritten.
    pub string_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            max_near_misses: default_max_near_misses(),
            separators: default_separators(),
            drop_key_sets: default_drop_key_sets(),
            core_keys: default_core_keys(),
            string_field: "path".to_string(),
        }
    }
}

impl SearchConfig {
    /// Worker count after resolving `0` and applying [`MAX_PARALLELISM`].
    #[must_use]
    pub fn resolved_parallelism(&self) -> usize {
        let requested = if self.parallelism == 0 {
            std::thread::available_parallelism().map_or(4, |v| v.get().max(1))
        } else {
            self.parallelism
        };
        requested.min(MAX_PARALLELISM)
    }
}

const fn default_max_near_misses() -> usize {
    5
}

fn default_separators() -> Vec<(String, String)> {
    [
        (DEFAULT_ITEM_SEPARATOR, DEFAULT_KV_SEPARATOR),
        (", ", ": "),
        (",", ": "),
        (", ", ":"),
    ]
    .into_iter()
    .map(|(item, kv)| (item.to_string(), kv.to_string()))
    .collect()
}

fn default_drop_key_sets() -> Vec<Vec<String>> {
    let sets: [&[&str]; 2] = [
        &["active_permissions", "commands", "events"],
        &[
            "active_permissions",
            "commands",
            "events",
            "last_update_time",
            "disable_reasons",
            "state",
            "first_install_time",
        ],
    ];
    sets.iter()
        .map(|set| set.iter().map(ToString::to_string).collect())
        .collect()
}

fn default_core_keys() -> Vec<String> {
    [
        "path",
        "location",
        "from_webstore",
        "creation_flags",
        "was_installed_by_default",
        "was_installed_by_oem",
    ]
    .into_iter()
    .map(ToString::to_string)
    .collect()
}

/// Batch report limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Failures described in full.
    pub max_failures: usize,

    /// Characters kept at each end of a long canonical string.
    pub excerpt_len: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            excerpt_len: 200,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
