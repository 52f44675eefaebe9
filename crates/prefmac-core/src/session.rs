//! One verification run: keying material, records and configuration.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::canonical::{KeyOrderAnalysis, canonicalize};
use crate::config::PrefmacConfig;
use crate::error::SessionError;
use crate::mac::{MacContext, MacTag, MessageBreakdown, compute_mac};
use crate::record::{PathMacRecord, StoreKind};
use crate::report::{BatchReport, Excerpt, FailureBreakdown, RecordOutcome};
use crate::search::{Diagnosis, HypothesisSearch};
use crate::value::{DottedPath, Lookup, Snapshot};

/// Result of checking one record under the session policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Whether `computed` equals the stored MAC.
    pub matched: bool,
    /// Tag computed from the snapshot value.
    pub computed: MacTag,
    /// Canonical string that was signed.
    pub canonical: String,
}

/// A stored MAC that has not yet been paired with a snapshot value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMac {
    /// Store the MAC was read from.
    pub store: StoreKind,
    /// Protected path.
    pub path: DottedPath,
    /// Stored tag.
    pub expected_mac: MacTag,
}

/// Owns everything one run needs. Nothing here is global.
#[derive(Debug, Default)]
pub struct VerificationSession {
    contexts: BTreeMap<StoreKind, MacContext>,
    records: Vec<PathMacRecord>,
    absent: Vec<ExpectedMac>,
    config: PrefmacConfig,
}

impl VerificationSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(config: PrefmacConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Registers keying material for `store`, replacing any previous one.
    pub fn insert_context(&mut self, store: StoreKind, ctx: MacContext) {
        self.contexts.insert(store, ctx);
    }

    /// Adds a record that already carries its value.
    pub fn push_record(&mut self, record: PathMacRecord) {
        self.records.push(record);
    }

    /// Pairs each expected MAC with its value in `snapshot`. Paths missing
    /// from the snapshot are kept aside and reported as absent.
    ///
    /// Returns the number of records resolved to a value.
    pub fn resolve<I>(&mut self, snapshot: &Snapshot, expected: I) -> usize
    where
        I: IntoIterator<Item = ExpectedMac>,
    {
        let mut resolved = 0;
        for entry in expected {
            match snapshot.lookup(&entry.path) {
                Lookup::Present(value) => {
                    self.records.push(PathMacRecord::new(
                        entry.store,
                        entry.path,
                        entry.expected_mac,
                        value.clone(),
                    ));
                    resolved += 1;
                },
                Lookup::Absent => {
                    debug!(store = %entry.store, path = %entry.path, "path absent from snapshot");
                    self.absent.push(entry);
                },
            }
        }
        resolved
    }

    /// Records with a value, in insertion order.
    #[must_use]
    pub fn records(&self) -> &[PathMacRecord] {
        &self.records
    }

    /// Finds a resolved record by store and path.
    #[must_use]
    pub fn record(&self, store: StoreKind, path: &DottedPath) -> Option<&PathMacRecord> {
        self.records
            .iter()
            .find(|r| r.store == store && r.path == *path)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PrefmacConfig {
        &self.config
    }

    /// Keying material for `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingContext`] if none was registered.
    pub fn context(&self, store: StoreKind) -> Result<&MacContext, SessionError> {
        self.contexts
            .get(&store)
            .ok_or(SessionError::MissingContext { store })
    }

    /// Checks one record under the configured policy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingContext`] if the record's store has no
    /// keying material.
    pub fn verify(&self, record: &PathMacRecord) -> Result<Verification, SessionError> {
        let ctx = self.context(record.store)?;
        let canonical = canonicalize(&record.value, &self.config.policy);
        let computed = compute_mac(ctx, record.path.as_str(), &canonical);
        Ok(Verification {
            matched: computed == record.expected_mac,
            computed,
            canonical,
        })
    }

    /// Runs the hypothesis search for one record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingContext`] if the record's store has no
    /// keying material.
    pub fn diagnose(&self, record: &PathMacRecord) -> Result<Diagnosis, SessionError> {
        self.diagnose_with_reference(record, None)
    }

    /// Like [`Self::diagnose`], ranking near-misses against a canonical
    /// length the vendor is known to have signed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingContext`] if the record's store has no
    /// keying material.
    pub fn diagnose_with_reference(
        &self,
        record: &PathMacRecord,
        reference_len: Option<usize>,
    ) -> Result<Diagnosis, SessionError> {
        let ctx = self.context(record.store)?;
        Ok(
            HypothesisSearch::new(ctx, &self.config.search, &self.config.policy)
                .with_peers(&self.records)
                .with_reference_len(reference_len)
                .run(record),
        )
    }

    /// Verifies every record. Failures past `report.max_failures` are only
    /// counted. With `with_diagnoses`, each described failure also carries a
    /// search result.
    #[must_use]
    pub fn batch_report(&self, with_diagnoses: bool) -> BatchReport {
        let mut report = BatchReport::default();

        for record in &self.records {
            let (store, path) = (record.store, record.path.clone());
            let verification = match self.verify(record) {
                Ok(v) => v,
                Err(err) => {
                    report.push(RecordOutcome::Error {
                        store,
                        path,
                        message: err.to_string(),
                    });
                    continue;
                },
            };
            if verification.matched {
                report.push(RecordOutcome::Passed { store, path });
                continue;
            }

            if report.failures.len() < self.config.report.max_failures {
                report
                    .failures
                    .push(self.breakdown(record, verification, with_diagnoses));
            }
            report.push(RecordOutcome::Failed { store, path });
        }

        for entry in &self.absent {
            let (store, path) = (entry.store, entry.path.clone());
            report.push(match self.context(store) {
                Ok(ctx) => RecordOutcome::Absent {
                    matches_empty: compute_mac(ctx, path.as_str(), "") == entry.expected_mac,
                    store,
                    path,
                },
                Err(err) => RecordOutcome::Error {
                    store,
                    path,
                    message: err.to_string(),
                },
            });
        }

        info!(
            passed = report.passed,
            failed = report.failed,
            absent = report.absent,
            errors = report.errors,
            "batch verification complete"
        );
        report
    }

    fn breakdown(
        &self,
        record: &PathMacRecord,
        verification: Verification,
        with_diagnosis: bool,
    ) -> FailureBreakdown {
        let message = self.context(record.store).map_or_else(
            |_| MessageBreakdown::default(),
            |ctx| MessageBreakdown::of(ctx, record.path.as_str(), &verification.canonical),
        );
        let diagnosis = if with_diagnosis {
            self.diagnose(record).ok()
        } else {
            None
        };
        FailureBreakdown {
            store: record.store,
            path: record.path.clone(),
            expected_mac: record.expected_mac,
            computed_mac: verification.computed,
            message,
            canonical: Excerpt::of(&verification.canonical, self.config.report.excerpt_len),
            key_order: KeyOrderAnalysis::of(&record.value),
            diagnosis,
        }
    }
}
