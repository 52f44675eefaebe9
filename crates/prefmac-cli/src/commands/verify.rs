//! `prefmac verify`: check every stored MAC of a capture.
//!
//! # Exit Codes
//!
//! - 0: every MAC matched (absent values signed as empty count as matched)
//! - 1: error (unreadable input, bad capture, bad snapshot)
//! - 2: at least one MAC did not match or could not be checked

use std::path::PathBuf;

use clap::Args;
use prefmac_core::report::{Excerpt, FailureBreakdown, RecordOutcome};
use prefmac_core::{BatchReport, KeyOrderAnalysis};

use super::{build_session, load_snapshot, output_error, print_json};
use crate::capture::Capture;
use crate::commands::diagnose::print_diagnosis;

/// Exit codes for the verify command.
pub mod exit_codes {
    /// All records verified.
    pub const SUCCESS: u8 = 0;
    /// General error exit code.
    pub const ERROR: u8 = 1;
    /// Some record failed verification.
    pub const MISMATCH: u8 = 2;
}

/// Arguments for `prefmac verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Ground-truth capture (device id, seeds, stored MACs).
    #[arg(long)]
    pub capture: PathBuf,

    /// Preference snapshot to verify.
    #[arg(long)]
    pub prefs: PathBuf,

    /// Only check paths containing this substring.
    #[arg(long)]
    pub filter: Option<String>,

    /// Run the hypothesis search for each described failure.
    #[arg(long)]
    pub diagnose: bool,
}

/// Execute the verify command.
pub fn run_verify(
    args: &VerifyArgs,
    config: &prefmac_core::PrefmacConfig,
    json_output: bool,
) -> u8 {
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

    let (session, resolved) = build_session(config, &capture, &snapshot, args.filter.as_deref());
    tracing::debug!(resolved, "paired capture with snapshot");
    let report = session.batch_report(args.diagnose);

    if json_output {
        if let Err(e) = print_json(&report) {
            return output_error(true, "output_failed", &format!("{e:#}"), exit_codes::ERROR);
        }
    } else {
        print_report(&report);
    }

    if report.is_clean() {
        exit_codes::SUCCESS
    } else {
        exit_codes::MISMATCH
    }
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        match outcome {
            RecordOutcome::Passed { store, path } => println!("[PASS]   {store:<8} {path}"),
            RecordOutcome::Failed { store, path } => println!("[FAIL]   {store:<8} {path}"),
            RecordOutcome::Absent {
                store,
                path,
                matches_empty,
            } => {
                let note = if *matches_empty {
                    " (signed as empty)"
                } else {
                    ""
                };
                println!("[ABSENT] {store:<8} {path}{note}");
            },
            RecordOutcome::Error {
                store,
                path,
                message,
            } => println!("[ERROR]  {store:<8} {path}: {message}"),
        }
    }

    println!();
    println!(
        "{} passed, {} failed, {} absent, {} errors ({} total)",
        report.passed,
        report.failed,
        report.absent,
        report.errors,
        report.total()
    );

    if report.failures.is_empty() {
        return;
    }
    println!();
    println!("First {} failure(s):", report.failures.len());
    for failure in &report.failures {
        print_failure(failure);
    }
}

fn print_failure(failure: &FailureBreakdown) {
    let m = &failure.message;
    println!();
    println!("  {} ({})", failure.path, failure.store);
    println!("    expected: {}", failure.expected_mac);
    println!("    computed: {}", failure.computed_mac);
    println!(
        "    message:  device_id {} + path {} + canonical {} = {} bytes",
        m.device_id_len, m.path_len, m.canonical_len, m.message_len
    );
    match &failure.canonical {
        Excerpt::Full { text } => println!("    canonical: {text}"),
        Excerpt::Split {
            head,
            tail,
            omitted,
        } => {
            println!("    canonical head: {head}");
            println!("    canonical tail: {tail}");
            println!("    ({omitted} characters omitted)");
        },
    }
    if let Some(order) = &failure.key_order {
        print_key_order(order, "    ");
    }
    if let Some(diagnosis) = &failure.diagnosis {
        print_diagnosis(diagnosis, "    ");
    }
}

/// Prints a one-line key order summary.
pub(crate) fn print_key_order(order: &KeyOrderAnalysis, indent: &str) {
    let keys = order.source_order.len();
    if order.already_sorted() {
        println!("{indent}key order: {keys} keys, already sorted");
    } else if let Some(d) = &order.first_divergence {
        println!(
            "{indent}key order: {keys} keys, first differs at {}: source {:?}, sorted {:?}",
            d.position, d.source_key, d.sorted_key
        );
    }
}
