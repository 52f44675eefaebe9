//! # prefmac-core
//!
//! Canonicalization, keyed MACs and hypothesis search for preference stores
//! that protect each value with an HMAC.
//!
//! A protected preference is signed as
//! `HMAC-SHA256(seed, device_id || path || canonical(value))`. Reproducing
//! the tag requires reproducing the canonical string byte for byte, so this
//! crate exposes the canonicalizer as a parameterized pure function and a
//! search engine that tries the plausible variants when the default one does
//! not match.
//!
//! ## Modules
//!
//! - [`value`]: the preference tree, dotted paths and snapshots
//! - [`canonical`]: [`canonicalize`] and its [`CanonicalizationPolicy`]
//! - [`mac`]: per-path MACs and the super-MAC
//! - [`search`]: [`HypothesisSearch`] over a declared space of variants
//! - [`session`]: [`VerificationSession`], which owns keying material and
//!   records for one run and produces a [`BatchReport`]
//! - [`config`]: TOML configuration
//!
//! ## Example
//!
//! ```rust
//! use prefmac_core::{
//!     CanonicalizationPolicy, DottedPath, MacContext, PrefValue, canonicalize, compute_mac,
//! };
//! use secrecy::SecretString;
//!
//! let ctx = MacContext::new(SecretString::from("S"), "D1");
//! let path = DottedPath::parse("a.b").unwrap();
//! let value = PrefValue::from_json_str(r#"{"x": 1, "y": []}"#).unwrap();
//!
//! let canonical = canonicalize(&value, &CanonicalizationPolicy::default());
//! assert_eq!(canonical, r#"{"x":1}"#);
//!
//! let tag = compute_mac(&ctx, path.as_str(), &canonical);
//! assert_eq!(tag.to_string().len(), 64);
//! ```

pub mod canonical;
pub mod config;
pub mod error;
pub mod mac;
pub mod record;
pub mod report;
pub mod search;
pub mod session;
pub mod value;

pub use canonical::{CanonicalizationPolicy, KeyOrderAnalysis, canonicalize, prune_empty};
pub use config::{ConfigError, PrefmacConfig};
pub use error::{MalformedInput, SessionError};
pub use mac::{
    MacContext, MacTag, MessageBreakdown, compute_mac, compute_nested_super_mac,
    compute_super_mac, compute_super_mac_over,
};
pub use record::{PathMacRecord, StoreKind};
pub use report::BatchReport;
pub use search::{Diagnosis, HypothesisSearch, SearchExhausted, SearchResult};
pub use session::{ExpectedMac, VerificationSession, Verification};
pub use value::{DottedPath, Lookup, PrefMap, PrefValue, Snapshot};
