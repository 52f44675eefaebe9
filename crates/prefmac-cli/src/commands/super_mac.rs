//! `prefmac super-mac`: recompute the MAC over the whole MAC table.
//!
//! # Exit Codes
//!
//! - 0: computed super-MAC matches (or nothing to compare against)
//! - 1: error
//! - 2: mismatch

use std::path::PathBuf;

use clap::Args;
use prefmac_core::{DottedPath, MacTag, PrefValue, compute_super_mac_over};
use serde::Serialize;

use super::{load_snapshot, output_error, print_json};
use crate::capture::Capture;

/// Exit codes for the super-mac command.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// General error exit code.
    pub const ERROR: u8 = 1;
    /// The stored super-MAC differs.
    pub const MISMATCH: u8 = 2;
}

const MACS_PATH: &str = "protection.macs";
const SUPER_MAC_PATH: &str = "protection.super_mac";

/// Arguments for `prefmac super-mac`.
#[derive(Debug, Args)]
pub struct SuperMacArgs {
    /// Capture supplying the device id and super-MAC seed.
    #[arg(long)]
    pub capture: PathBuf,

    /// Preference snapshot with a `protection.macs` table.
    #[arg(long)]
    pub prefs: PathBuf,
}

/// Where the expected super-MAC came from.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum Source {
    Snapshot,
    Capture,
}

#[derive(Debug, Serialize)]
struct SuperMacOutput {
    computed: MacTag,
    expected: Option<MacTag>,
    source: Option<Source>,
    matched: Option<bool>,
}

/// Execute the super-mac command.
pub fn run_super_mac(args: &SuperMacArgs, json_output: bool) -> u8 {
    let capture = match Capture::load(&args.capture) {
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

    let lookup = |path: &str| {
        DottedPath::parse(path)
            .ok()
            .and_then(|p| snapshot.lookup(&p).present())
    };
    let Some(macs) = lookup(MACS_PATH) else {
        return output_error(
            json_output,
            "absent",
            &format!("{MACS_PATH} is not present in the snapshot"),
            exit_codes::ERROR,
        );
    };

    let stored = match lookup(SUPER_MAC_PATH) {
        None | Some(PrefValue::Null) => None,
        Some(value) => match value.as_str().map(MacTag::parse) {
            Some(Ok(tag)) => Some(tag),
            _ => {
                return output_error(
                    json_output,
                    "invalid_super_mac",
                    &format!("{SUPER_MAC_PATH} is not a MAC"),
                    exit_codes::ERROR,
                );
            },
        },
    };
    let (expected, source) = match (stored, capture.super_mac) {
        (Some(tag), _) => (Some(tag), Some(Source::Snapshot)),
        (None, Some(tag)) => (Some(tag), Some(Source::Capture)),
        (None, None) => (None, None),
    };

    let computed = compute_super_mac_over(&capture.super_mac_context(), macs);
    let output = SuperMacOutput {
        computed,
        expected,
        source,
        matched: expected.map(|tag| tag == computed),
    };

    if json_output {
        if let Err(e) = print_json(&output) {
            return output_error(true, "output_failed", &format!("{e:#}"), exit_codes::ERROR);
        }
    } else {
        println!("computed: {computed}");
        match (output.expected, output.source) {
            (Some(tag), Some(source)) => {
                let verdict = if output.matched == Some(true) {
                    "match"
                } else {
                    "MISMATCH"
                };
                let from = match source {
                    Source::Snapshot => SUPER_MAC_PATH,
                    Source::Capture => "capture",
                };
                println!("expected: {tag} (from {from}, {verdict})");
            },
            _ => println!("expected: none recorded"),
        }
    }

    if output.matched == Some(false) {
        exit_codes::MISMATCH
    } else {
        exit_codes::SUCCESS
    }
}
