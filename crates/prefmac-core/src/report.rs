//! Batch verification report.

use serde::Serialize;

use crate::canonical::KeyOrderAnalysis;
use crate::mac::{MacTag, MessageBreakdown};
use crate::record::StoreKind;
use crate::search::Diagnosis;
use crate::value::DottedPath;

/// A canonical string, shortened when long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum Excerpt {
    /// The whole string; it is at most twice the excerpt length.
    Full {
        /// Text.
        text: String,
    },
    /// First and last characters of a longer string.
    Split {
        /// Leading characters.
        head: String,
        /// Trailing characters.
        tail: String,
        /// Characters between `head` and `tail`.
        omitted: usize,
    },
}

impl Excerpt {
    /// Keeps `s` whole if it has at most `2 * len` characters, otherwise the
    /// first and last `len` characters.
    #[must_use]
    pub fn of(s: &str, len: usize) -> Self {
        let chars = s.chars().count();
        if chars <= len.saturating_mul(2) {
            return Self::Full {
                text: s.to_string(),
            };
        }
        Self::Split {
            head: s.chars().take(len).collect(),
            tail: s.chars().skip(chars - len).collect(),
            omitted: chars - 2 * len,
        }
    }
}

/// Everything needed to eyeball one failing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBreakdown {
    /// Store the record belongs to.
    pub store: StoreKind,
    /// Record path.
    pub path: DottedPath,
    /// Stored tag.
    pub expected_mac: MacTag,
    /// Tag under the session policy.
    pub computed_mac: MacTag,
    /// Message component lengths.
    pub message: MessageBreakdown,
    /// Canonical string under the session policy.
    pub canonical: Excerpt,
    /// Top-level key order, for map values.
    pub key_order: Option<KeyOrderAnalysis>,
    /// Search outcome, when requested.
    pub diagnosis: Option<Diagnosis>,
}

/// Verdict for one stored MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The MAC matched under the session policy.
    Passed {
        /// Store the record belongs to.
        store: StoreKind,
        /// Record path.
        path: DottedPath,
    },
    /// The MAC did not match.
    Failed {
        /// Store the record belongs to.
        store: StoreKind,
        /// Record path.
        path: DottedPath,
    },
    /// The path is missing from the snapshot.
    Absent {
        /// Store the MAC belongs to.
        store: StoreKind,
        /// Missing path.
        path: DottedPath,
        /// Whether the stored MAC is the MAC of an empty value string,
        /// which is how a cleared preference is signed.
        matches_empty: bool,
    },
    /// The record could not be checked at all.
    Error {
        /// Store the record belongs to.
        store: StoreKind,
        /// Record path.
        path: DottedPath,
        /// Reason.
        message: String,
    },
}

impl RecordOutcome {
    /// Path the outcome is about.
    #[must_use]
    pub const fn path(&self) -> &DottedPath {
        match self {
            Self::Passed { path, .. }
            | Self::Failed { path, .. }
            | Self::Absent { path, .. }
            | Self::Error { path, .. } => path,
        }
    }

    /// True unless the record failed, errored, or is absent without an
    /// empty-value explanation.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Passed { .. }
                | Self::Absent {
                    matches_empty: true,
                    ..
                }
        )
    }
}

/// Result of verifying every record in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records whose MAC matched.
    pub passed: usize,
    /// Records whose MAC did not match.
    pub failed: usize,
    /// Stored MACs with no value in the snapshot.
    pub absent: usize,
    /// Records that could not be checked.
    pub errors: usize,
    /// One entry per stored MAC: resolved records first in insertion order,
    /// then absent ones.
    pub outcomes: Vec<RecordOutcome>,
    /// Details for the first failures, in record order.
    pub failures: Vec<FailureBreakdown>,
}

impl BatchReport {
    /// True if every outcome is ok.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(RecordOutcome::is_ok)
    }

    /// Number of stored MACs examined.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub(crate) fn push(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Passed { .. } => self.passed += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::Absent { .. } => self.absent += 1,
            RecordOutcome::Error { .. } => self.errors += 1,
        }
        self.outcomes.push(outcome);
    }
}
