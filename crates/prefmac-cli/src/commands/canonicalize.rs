//! `prefmac canonicalize`: show exactly what would be signed for one value.
//!
//! Policy flags override the configured policy one field at a time.
//!
//! # Exit Codes
//!
//! - 0: success
//! - 1: error (bad input, path absent from the snapshot)

use std::path::PathBuf;

use clap::Args;
use prefmac_core::{
    CanonicalizationPolicy, DottedPath, KeyOrderAnalysis, MacTag, MessageBreakdown, PrefmacConfig,
    StoreKind, canonicalize, compute_mac,
};
use serde::Serialize;

use super::diagnose::StoreArg;
use super::verify::print_key_order;
use super::{load_snapshot, output_error, print_json};
use crate::capture::Capture;

/// Exit codes for the canonicalize command.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// General error exit code.
    pub const ERROR: u8 = 1;
}

/// Arguments for `prefmac canonicalize`.
#[derive(Debug, Args)]
pub struct CanonicalizeArgs {
    /// Preference snapshot holding the value.
    #[arg(long)]
    pub prefs: PathBuf,

    /// Dotted path of the value.
    #[arg(long)]
    pub path: String,

    /// Capture supplying the keying material; adds the MAC to the output.
    #[arg(long)]
    pub capture: Option<PathBuf>,

    /// Store whose seed signs the value.
    #[arg(long, value_enum, default_value = "file")]
    pub store: StoreArg,

    /// Sort map keys byte-wise.
    #[arg(long)]
    pub sort_keys: Option<bool>,

    /// Drop empty maps and lists from maps.
    #[arg(long)]
    pub prune: Option<bool>,

    /// Escape non-ASCII characters as \uXXXX.
    #[arg(long)]
    pub ascii_escape: Option<bool>,

    /// Escape `<` in strings.
    #[arg(long)]
    pub escape_lt: Option<bool>,

    /// Separator between siblings.
    #[arg(long)]
    pub item_separator: Option<String>,

    /// Separator between a key and its value.
    #[arg(long)]
    pub kv_separator: Option<String>,
}

impl CanonicalizeArgs {
    fn policy(&self, base: &CanonicalizationPolicy) -> CanonicalizationPolicy {
        let mut policy = base.clone();
        if let Some(sort) = self.sort_keys {
            policy = policy.with_sort_keys(sort);
        }
        if let Some(prune) = self.prune {
            policy = policy.with_prune_empty_containers(prune);
        }
        if let Some(ascii) = self.ascii_escape {
            policy = policy.with_ascii_escape(ascii);
        }
        if let Some(lt) = self.escape_lt {
            policy = policy.with_escape_angle_bracket(lt);
        }
        if self.item_separator.is_some() || self.kv_separator.is_some() {
            let item = self
                .item_separator
                .clone()
                .unwrap_or_else(|| policy.item_separator().to_string());
            let kv = self
                .kv_separator
                .clone()
                .unwrap_or_else(|| policy.kv_separator().to_string());
            policy = policy.with_separators(item, kv);
        }
        policy
    }
}

/// MAC details, present when a capture was given.
#[derive(Debug, Serialize)]
struct Signature {
    store: StoreKind,
    computed_mac: MacTag,
    expected_mac: Option<MacTag>,
    matched: Option<bool>,
    message: MessageBreakdown,
}

#[derive(Debug, Serialize)]
struct CanonicalOutput {
    path: DottedPath,
    policy: CanonicalizationPolicy,
    canonical: String,
    length: usize,
    key_order: Option<KeyOrderAnalysis>,
    signature: Option<Signature>,
}

/// Execute the canonicalize command.
pub fn run_canonicalize(
    args: &CanonicalizeArgs,
    config: &PrefmacConfig,
    json_output: bool,
) -> u8 {
    let path = match DottedPath::parse(&args.path) {
        Ok(path) => path,
        Err(e) => {
            return output_error(json_output, "invalid_path", &e.to_string(), exit_codes::ERROR);
        },
    };
    let snapshot = match load_snapshot(&args.prefs) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return output_error(
                json_output,
                "invalid_snapshot",
                &format!("{e:#}"),
                exit_codes::ERROR,
            );
        },
    };
    let capture = match args.capture.as_deref().map(Capture::load).transpose() {
        Ok(capture) => capture,
        Err(e) => {
            return output_error(
                json_output,
                "invalid_capture",
                &format!("{e:#}"),
                exit_codes::ERROR,
            );
        },
    };

    let Some(value) = snapshot.lookup(&path).present() else {
        return output_error(
            json_output,
            "absent",
            &format!("{path} is not present in the snapshot"),
            exit_codes::ERROR,
        );
    };

    let policy = args.policy(&config.policy);
    let canonical = canonicalize(value, &policy);
    let signature = capture.map(|capture| {
        let store = StoreKind::from(args.store);
        let ctx = capture.context(store);
        let computed_mac = compute_mac(&ctx, path.as_str(), &canonical);
        let table = match store {
            StoreKind::File => &capture.file_macs,
            StoreKind::Registry => &capture.registry_macs,
        };
        let expected_mac = table.iter().find(|(p, _)| *p == path).map(|(_, tag)| *tag);
        Signature {
            store,
            computed_mac,
            expected_mac,
            matched: expected_mac.map(|tag| tag == computed_mac),
            message: MessageBreakdown::of(&ctx, path.as_str(), &canonical),
        }
    });

    let output = CanonicalOutput {
        length: canonical.len(),
        key_order: KeyOrderAnalysis::of(value),
        path,
        policy,
        canonical,
        signature,
    };

    if json_output {
        if let Err(e) = print_json(&output) {
            return output_error(true, "output_failed", &format!("{e:#}"), exit_codes::ERROR);
        }
    } else {
        print_output(&output);
    }
    exit_codes::SUCCESS
}

fn print_output(output: &CanonicalOutput) {
    println!("{}", output.canonical);
    println!();
    println!("path:   {}", output.path);
    println!("policy: {}", output.policy);
    println!("length: {} bytes", output.length);
    if let Some(order) = &output.key_order {
        print_key_order(order, "");
    }
    let Some(sig) = &output.signature else {
        return;
    };
    println!("mac:    {} ({})", sig.computed_mac, sig.store);
    match (sig.expected_mac, sig.matched) {
        (Some(expected), Some(true)) => println!("stored: {expected} (match)"),
        (Some(expected), _) => println!("stored: {expected} (MISMATCH)"),
        (None, _) => println!("stored: none in capture"),
    }
}
