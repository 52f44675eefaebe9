//! Subcommand implementations.
//!
//! Every command returns its exit code as a `u8`. Errors are printed to
//! stderr, as an [`ErrorResponse`] object with `--json`.

pub mod canonicalize;
pub mod diagnose;
pub mod super_mac;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use prefmac_core::{PrefmacConfig, Snapshot, StoreKind, VerificationSession};
use serde::{Deserialize, Serialize};

use crate::capture::Capture;

/// Error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Output an error in the appropriate format and return `exit_code`.
pub fn output_error(json_output: bool, code: &str, message: &str, exit_code: u8) -> u8 {
    if json_output {
        let error = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
        };
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&error).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        eprintln!("Error: {message}");
    }
    exit_code
}

/// Pretty-print `value` as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

/// Reads a preference snapshot.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Snapshot::from_json_str(&text).with_context(|| format!("invalid snapshot {}", path.display()))
}

/// Pairs a capture with a snapshot. Returns the session and how many
/// expected MACs resolved to a value.
pub fn build_session(
    config: &PrefmacConfig,
    capture: &Capture,
    snapshot: &Snapshot,
    filter: Option<&str>,
) -> (VerificationSession, usize) {
    let mut session = VerificationSession::new(config.clone());
    for store in [StoreKind::File, StoreKind::Registry] {
        session.insert_context(store, capture.context(store));
    }
    let resolved = session.resolve(snapshot, capture.expected(filter));
    (session, resolved)
}
