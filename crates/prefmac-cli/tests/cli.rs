//! Integration tests for the `prefmac` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tempfile::TempDir;

const DEVICE: &str = "S-1-5-21-1";
const SEED: &str = "";
const EXT: &str = "extensions.settings.abcdefghijklmnopabcdefghijklmnop";

fn hmac_hex(key: &str, message: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

fn path_mac(path: &str, canonical: &str) -> String {
    hmac_hex(SEED, &format!("{DEVICE}{path}{canonical}"))
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn snapshot(&self, super_mac: Option<&str>) -> PathBuf {
        let homepage_mac = path_mac("homepage", r#""https://example.org""#);
        let protection = super_mac.map_or_else(String::new, |tag| {
            format!(
                r#", "protection": {{"macs": {{"homepage": "{homepage_mac}"}}, "super_mac": "{tag}"}}"#
            )
        });
        self.write(
            "Secure Preferences",
            &format!(
                r#"{{
                    "homepage": "https://example.org",
                    "extensions": {{"settings": {{"abcdefghijklmnopabcdefghijklmnop": {{
                        "path": "ext\\1.0", "state": 1, "commands": {{}}
                    }}}}}}
                    {protection}
                }}"#
            ),
        )
    }

    fn capture(&self, ext_canonical: &str) -> PathBuf {
        self.write(
            "capture.json",
            &format!(
                r#"{{
                    "_description": "fixture",
                    "device_id": "{DEVICE}",
                    "file_mac_seed": "{SEED}",
                    "file_macs": {{
                        "homepage": "{}",
                        "{EXT}": "{}"
                    }}
                }}"#,
                path_mac("homepage", r#""https://example.org""#),
                path_mac(EXT, ext_canonical),
            ),
        )
    }
}

fn prefmac(args: &[&str], files: &[(&str, &Path)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_prefmac"));
    cmd.args(args);
    for (flag, path) in files {
        cmd.arg(flag).arg(path);
    }
    cmd.output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// verify
// =============================================================================

#[test]
fn verify_all_pass() {
    let fx = Fixture::new();
    let capture = fx.capture(r#"{"path":"ext\\1.0","state":1}"#);
    let prefs = fx.snapshot(None);

    let output = prefmac(&["verify"], &[("--capture", &capture), ("--prefs", &prefs)]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    let text = stdout(&output);
    assert_eq!(text.matches("[PASS]").count(), 2);
    assert!(text.contains("2 passed, 0 failed"));
}

#[test]
fn verify_reports_failure_details() {
    let fx = Fixture::new();
    let capture = fx.capture(r#"{"path":"ext\\1.0"}"#);
    let prefs = fx.snapshot(None);

    let output = prefmac(&["verify"], &[("--capture", &capture), ("--prefs", &prefs)]);
    assert_eq!(output.status.code(), Some(2));
    let text = stdout(&output);
    assert!(text.contains("[FAIL]"));
    assert!(text.contains("expected:"));
    assert!(text.contains("key order:"));
}

#[test]
fn verify_json_with_diagnosis() {
    let fx = Fixture::new();
    let capture = fx.capture(r#"{"path":"ext\\1.0"}"#);
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &["--json", "verify", "--diagnose", "--filter", "extensions"],
        &[("--capture", &capture), ("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(2));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["failed"], 1);
    assert_eq!(report["outcomes"].as_array().unwrap().len(), 1);
    assert_eq!(report["failures"][0]["diagnosis"]["outcome"], "matched");
}

#[test]
fn verify_missing_capture_is_error() {
    let fx = Fixture::new();
    let prefs = fx.snapshot(None);
    let missing = fx.dir.path().join("nope.json");

    let output = prefmac(
        &["--json", "verify"],
        &[("--capture", &missing), ("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(1));
    let error: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(error["code"], "invalid_capture");
}

// =============================================================================
// diagnose
// =============================================================================

#[test]
fn diagnose_finds_dropped_key() {
    let fx = Fixture::new();
    let capture = fx.capture(r#"{"path":"ext\\1.0"}"#);
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &["diagnose", "--path", EXT],
        &[("--capture", &capture), ("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains(r#"drop key "state""#));
}

#[test]
fn diagnose_exhausted() {
    let fx = Fixture::new();
    let capture = fx.capture(r#"{"path":"somewhere else"}"#);
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &["--json", "diagnose", "--path", EXT, "--reference-len", "30"],
        &[("--capture", &capture), ("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(2));
    let diagnosis: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(diagnosis["outcome"], "exhausted");
    assert_eq!(diagnosis["reference_len"], 30);
}

#[test]
fn diagnose_unknown_path() {
    let fx = Fixture::new();
    let capture = fx.capture("{}");
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &["diagnose", "--path", "no.such.pref"],
        &[("--capture", &capture), ("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(1));
}

// =============================================================================
// canonicalize
// =============================================================================

#[test]
fn canonicalize_prints_string_and_mac() {
    let fx = Fixture::new();
    let capture = fx.capture("{}");
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &["canonicalize", "--path", "homepage"],
        &[("--prefs", &prefs), ("--capture", &capture)],
    );
    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.starts_with("\"https://example.org\"\n"));
    assert!(text.contains("(match)"));
}

#[test]
fn canonicalize_policy_flags() {
    let fx = Fixture::new();
    let prefs = fx.snapshot(None);

    let output = prefmac(
        &[
            "--json",
            "canonicalize",
            "--path",
            EXT,
            "--prune",
            "false",
            "--sort-keys",
            "false",
            "--item-separator",
            ", ",
        ],
        &[("--prefs", &prefs)],
    );
    assert_eq!(output.status.code(), Some(0));
    let out: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        out["canonical"],
        r#"{"path":"ext\\1.0", "state":1, "commands":{}}"#
    );
    assert!(out["signature"].is_null());
}

// =============================================================================
// super-mac
// =============================================================================

#[test]
fn super_mac_matches_snapshot() {
    let fx = Fixture::new();
    let homepage_mac = path_mac("homepage", r#""https://example.org""#);
    let expected = hmac_hex(SEED, &format!(r#"{DEVICE}{{"homepage":"{homepage_mac}"}}"#));
    let capture = fx.capture("{}");
    let prefs = fx.snapshot(Some(&expected));

    let output = prefmac(&["super-mac"], &[("--capture", &capture), ("--prefs", &prefs)]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains(&expected));
}

#[test]
fn super_mac_uses_separate_seed() {
    let fx = Fixture::new();
    let homepage_mac = path_mac("homepage", r#""https://example.org""#);
    let expected = hmac_hex("table-seed", &format!(r#"{DEVICE}{{"homepage":"{homepage_mac}"}}"#));
    let capture = fx.write(
        "capture.json",
        &format!(
            r#"{{"device_id": "{DEVICE}", "file_mac_seed": "{SEED}", "super_mac_seed": "table-seed"}}"#
        ),
    );
    let prefs = fx.snapshot(Some(&expected));

    let output = prefmac(&["super-mac"], &[("--capture", &capture), ("--prefs", &prefs)]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
}

#[test]
fn super_mac_mismatch() {
    let fx = Fixture::new();
    let wrong = hmac_hex("other", "x");
    let capture = fx.capture("{}");
    let prefs = fx.snapshot(Some(&wrong));

    let output = prefmac(&["super-mac"], &[("--capture", &capture), ("--prefs", &prefs)]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).contains("MISMATCH"));
}
