//! `prefmac diagnose`: hypothesis search for one stored MAC.
//!
//! # Exit Codes
//!
//! - 0: a hypothesis reproduced the stored MAC
//! - 1: error (bad input, path not in capture or snapshot)
//! - 2: search space exhausted

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use prefmac_core::search::{NearMissKind, SearchResult};
use prefmac_core::{Diagnosis, DottedPath, PrefmacConfig, StoreKind};

use super::{build_session, load_snapshot, output_error, print_json};
use crate::capture::Capture;

/// Exit codes for the diagnose command.
pub mod exit_codes {
    /// A hypothesis matched.
    pub const SUCCESS: u8 = 0;
    /// General error exit code.
    pub const ERROR: u8 = 1;
    /// No hypothesis matched.
    pub const EXHAUSTED: u8 = 2;
}

/// Store selector for command-line arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreArg {
    /// The preference file.
    File,
    /// The registry mirror.
    Registry,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::File => Self::File,
            StoreArg::Registry => Self::Registry,
        }
    }
}

/// Arguments for `prefmac diagnose`.
#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    /// Ground-truth capture (device id, seeds, stored MACs).
    #[arg(long)]
    pub capture: PathBuf,

    /// Preference snapshot holding the value.
    #[arg(long)]
    pub prefs: PathBuf,

    /// Dotted path of the protected preference.
    #[arg(long)]
    pub path: String,

    /// Store to look in. Without it the file store is tried first.
    #[arg(long, value_enum)]
    pub store: Option<StoreArg>,

    /// Canonical length the vendor is known to have signed, used to rank
    /// near-misses.
    #[arg(long)]
    pub reference_len: Option<usize>,
}

/// Execute the diagnose command.
pub fn run_diagnose(args: &DiagnoseArgs, config: &PrefmacConfig, json_output: bool) -> u8 {
    let path = match DottedPath::parse(&args.path) {
        Ok(path) => path,
        Err(e) => {
            return output_error(json_output, "invalid_path", &e.to_string(), exit_codes::ERROR);
        },
    };
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

    // Every record stays in the session so path confusions can be detected.
    let (session, _) = build_session(config, &capture, &snapshot, None);
    let stores: Vec<StoreKind> = match args.store {
        Some(store) => vec![store.into()],
        None => vec![StoreKind::File, StoreKind::Registry],
    };
    let Some(record) = stores
        .into_iter()
        .find_map(|store| session.record(store, &path))
    else {
        return output_error(
            json_output,
            "record_not_found",
            &format!("{path} has no stored MAC with a value in the snapshot"),
            exit_codes::ERROR,
        );
    };

    let diagnosis = match session.diagnose_with_reference(record, args.reference_len) {
        Ok(diagnosis) => diagnosis,
        Err(e) => {
            return output_error(json_output, "missing_context", &e.to_string(), exit_codes::ERROR);
        },
    };

    if json_output {
        if let Err(e) = print_json(&diagnosis) {
            return output_error(true, "output_failed", &format!("{e:#}"), exit_codes::ERROR);
        }
    } else {
        println!("{} ({})", record.path, record.store);
        println!("  expected: {}", record.expected_mac);
        print_diagnosis(&diagnosis, "  ");
    }

    match diagnosis {
        Diagnosis::Matched { .. } => exit_codes::SUCCESS,
        Diagnosis::Exhausted(_) => exit_codes::EXHAUSTED,
    }
}

/// Prints a diagnosis in text form.
pub(crate) fn print_diagnosis(diagnosis: &Diagnosis, indent: &str) {
    match diagnosis {
        Diagnosis::Matched { result, attempts } => {
            println!("{indent}diagnosis: matched after {attempts} hypotheses");
            print_candidate(result, &format!("{indent}  "));
            println!("{indent}  canonical: {}", result.canonical_string);
        },
        Diagnosis::Exhausted(exhausted) => {
            println!("{indent}diagnosis: {exhausted}");
            if exhausted.near_misses.is_empty() {
                return;
            }
            println!(
                "{indent}near misses (reference length {}):",
                exhausted.reference_len
            );
            for miss in &exhausted.near_misses {
                match &miss.kind {
                    NearMissKind::PathConfusion { other_path } => {
                        println!("{indent}  - path confusion with {other_path}");
                    },
                    NearMissKind::LengthDelta { delta } => {
                        println!("{indent}  - length delta {delta:+}");
                    },
                }
                print_candidate(&miss.result, &format!("{indent}    "));
            }
        },
    }
}

fn print_candidate(result: &SearchResult, indent: &str) {
    println!("{indent}hypothesis #{}", result.hypothesis_index);
    println!("{indent}value:  {}", result.value_variant);
    println!("{indent}path:   {} {:?}", result.path_variant, result.path_used);
    println!("{indent}policy: {}", result.policy);
    println!(
        "{indent}canonical length: {}",
        result.canonical_string.len()
    );
}
