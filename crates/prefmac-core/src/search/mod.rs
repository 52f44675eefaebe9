//! Hypothesis search over canonicalization variants.
//!
//! Given a record whose stored MAC does not match under the default policy,
//! [`HypothesisSearch`] walks a [`SearchSpace`] of path renderings, value
//! rewrites and policies in a fixed order and reports the first combination
//! that reproduces the stored tag. A reported match has been recomputed
//! from scratch, so it is never a false positive.
//!
//! When nothing matches, the result carries near-misses:
//!
//! - path confusion: a candidate reproduced the stored MAC of a different
//!   record, or this record's value matches when signed under another
//!   record's path;
//! - length delta: candidates whose canonical length is closest to the
//!   reference length.

mod engine;
mod space;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use self::space::{
    Candidate, PathVariant, SearchSpace, SeparatorStyle, ValueTransform,
};
use crate::canonical::{CanonicalizationPolicy, canonicalize};
use crate::config::SearchConfig;
use crate::mac::{MacContext, MacTag, compute_mac};
use crate::record::PathMacRecord;
use crate::value::DottedPath;

/// One evaluated hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Whether `computed_mac` equals the record's expected MAC.
    pub matched: bool,
    /// Policy used for canonicalization.
    pub policy: CanonicalizationPolicy,
    /// Rewrite applied to the value first.
    pub value_variant: ValueTransform,
    /// Path rendering used in the message.
    pub path_variant: PathVariant,
    /// The path string actually signed.
    pub path_used: String,
    /// Canonical string that was signed.
    pub canonical_string: String,
    /// Resulting tag.
    pub computed_mac: MacTag,
    /// Position in enumeration order.
    pub hypothesis_index: usize,
}

/// Why a non-matching candidate is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NearMissKind {
    /// The MAC belongs to another record, or the value matches under
    /// another record's path.
    PathConfusion {
        /// The other record's path.
        other_path: DottedPath,
    },
    /// Canonical length differs from the reference by `delta` bytes.
    LengthDelta {
        /// Signed difference, candidate minus reference.
        delta: i64,
    },
}

/// A candidate worth showing even though it did not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NearMiss {
    /// Classification.
    pub kind: NearMissKind,
    /// The candidate itself.
    pub result: SearchResult,
}

/// No hypothesis in the declared space reproduces the stored MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("none of {attempts} hypotheses reproduce the MAC for {path}")]
pub struct SearchExhausted {
    /// Record path.
    pub path: DottedPath,
    /// Candidates evaluated.
    pub attempts: usize,
    /// Length the near-misses were ranked against.
    pub reference_len: usize,
    /// Closest candidates, path confusions first.
    pub near_misses: Vec<NearMiss>,
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Diagnosis {
    /// A hypothesis reproduced the stored MAC.
    Matched {
        /// The lowest-index match.
        result: SearchResult,
        /// Candidates up to and including the match in enumeration order.
        attempts: usize,
    },
    /// The space was exhausted.
    Exhausted(SearchExhausted),
}

impl Diagnosis {
    /// The match, if any.
    #[must_use]
    pub const fn matched(&self) -> Option<&SearchResult> {
        match self {
            Self::Matched { result, .. } => Some(result),
            Self::Exhausted(_) => None,
        }
    }

    /// Converts to a `Result` so exhaustion can be propagated with `?`.
    ///
    /// # Errors
    ///
    /// Returns the [`SearchExhausted`] report if nothing matched.
    pub fn into_result(self) -> Result<SearchResult, SearchExhausted> {
        match self {
            Self::Matched { result, .. } => Ok(result),
            Self::Exhausted(exhausted) => Err(exhausted),
        }
    }
}

/// Search driver bound to one keying context.
#[derive(Debug, Clone, Copy)]
pub struct HypothesisSearch<'a> {
    ctx: &'a MacContext,
    config: &'a SearchConfig,
    baseline: &'a CanonicalizationPolicy,
    peers: &'a [PathMacRecord],
    reference_len: Option<usize>,
}

impl<'a> HypothesisSearch<'a> {
    /// Creates a search using `baseline` as the first policy tried.
    #[must_use]
    pub const fn new(
        ctx: &'a MacContext,
        config: &'a SearchConfig,
        baseline: &'a CanonicalizationPolicy,
    ) -> Self {
        Self {
            ctx,
            config,
            baseline,
            peers: &[],
            reference_len: None,
        }
    }

    /// Other records of the same store, used to detect path confusion.
    #[must_use]
    pub const fn with_peers(self, peers: &'a [PathMacRecord]) -> Self {
        Self { peers, ..self }
    }

    /// Canonical length the vendor is known to have signed, if any. Without
    /// it, near-misses are ranked against the baseline canonical length.
    #[must_use]
    pub const fn with_reference_len(self, reference_len: Option<usize>) -> Self {
        Self {
            reference_len,
            ..self
        }
    }

    /// Searches for a hypothesis that reproduces `record.expected_mac`.
    #[must_use]
    pub fn run(&self, record: &PathMacRecord) -> Diagnosis {
        let space =
            SearchSpace::for_record(self.config, self.baseline, &record.path, &record.value);
        let workers = self.config.resolved_parallelism();
        debug!(
            path = %record.path,
            candidates = space.len(),
            transforms = space.transforms().len(),
            policies = space.policies().len(),
            workers,
            "starting hypothesis search"
        );

        let peer_tags: Vec<(&DottedPath, MacTag)> = self
            .peers
            .iter()
            .filter(|peer| peer.path != record.path)
            .map(|peer| (&peer.path, peer.expected_mac))
            .collect();

        let outcome = engine::run(self.ctx, record, &space, &peer_tags, workers);

        if let Some(index) = outcome.best {
            match self.reverify(record, &space, index) {
                Some(result) => {
                    info!(
                        path = %record.path,
                        index,
                        transform = %result.value_variant,
                        policy = %result.policy,
                        path_variant = %result.path_variant,
                        "hypothesis reproduces stored MAC"
                    );
                    return Diagnosis::Matched {
                        result,
                        attempts: index + 1,
                    };
                },
                None => warn!(
                    path = %record.path,
                    index,
                    "candidate failed re-verification; treating as no match"
                ),
            }
        }

        let exhausted = self.exhausted(record, &space, &outcome, &peer_tags);
        warn!(
            path = %record.path,
            attempts = exhausted.attempts,
            near_misses = exhausted.near_misses.len(),
            "no hypothesis reproduces stored MAC"
        );
        Diagnosis::Exhausted(exhausted)
    }

    /// Recomputes a candidate independently of the worker that found it.
    fn reverify(
        &self,
        record: &PathMacRecord,
        space: &SearchSpace,
        index: usize,
    ) -> Option<SearchResult> {
        let result = evaluate(self.ctx, record, space.candidate(index)?);
        result.matched.then_some(result)
    }

    fn exhausted(
        &self,
        record: &PathMacRecord,
        space: &SearchSpace,
        outcome: &engine::Outcome,
        peer_tags: &[(&DottedPath, MacTag)],
    ) -> SearchExhausted {
        let limit = self.config.max_near_misses;
        let mut near_misses = Vec::new();
        let baseline_canonical = canonicalize(&record.value, self.baseline);

        // One entry per distinct (path, canonical) message; the baseline is
        // already known not to match.
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        seen.insert((record.path.to_string(), baseline_canonical.clone()));
        let mut first_sighting = |result: &SearchResult| {
            seen.insert((result.path_used.clone(), result.canonical_string.clone()))
        };

        for &(index, other) in &outcome.confusions {
            if near_misses.len() >= limit {
                break;
            }
            let Some(candidate) = space.candidate(index) else {
                continue;
            };
            let result = evaluate(self.ctx, record, candidate);
            if first_sighting(&result) {
                near_misses.push(NearMiss {
                    kind: NearMissKind::PathConfusion {
                        other_path: peer_tags[other].0.clone(),
                    },
                    result,
                });
            }
        }

        for (other_path, _) in peer_tags {
            if near_misses.len() >= limit {
                break;
            }
            let tag = compute_mac(self.ctx, other_path.as_str(), &baseline_canonical);
            if tag != record.expected_mac {
                continue;
            }
            let result = SearchResult {
                matched: false,
                policy: self.baseline.clone(),
                value_variant: ValueTransform::Identity,
                path_variant: PathVariant::AsIs,
                path_used: other_path.to_string(),
                canonical_string: baseline_canonical.clone(),
                computed_mac: tag,
                hypothesis_index: 0,
            };
            if first_sighting(&result) {
                near_misses.push(NearMiss {
                    kind: NearMissKind::PathConfusion {
                        other_path: (*other_path).clone(),
                    },
                    result,
                });
            }
        }

        let reference_len = self.reference_len.unwrap_or(baseline_canonical.len());
        let mut ranked: Vec<(usize, usize)> = outcome
            .lengths
            .iter()
            .enumerate()
            .map(|(index, &len)| (len.abs_diff(reference_len), index))
            .collect();
        // Equal messages have equal lengths, so the lowest index of each
        // message is visited first.
        ranked.sort_unstable();

        for (_, index) in ranked {
            if near_misses.len() >= limit {
                break;
            }
            let Some(candidate) = space.candidate(index) else {
                continue;
            };
            let result = evaluate(self.ctx, record, candidate);
            if !first_sighting(&result) {
                continue;
            }
            let delta = signed_delta(result.canonical_string.len(), reference_len);
            near_misses.push(NearMiss {
                kind: NearMissKind::LengthDelta { delta },
                result,
            });
        }

        SearchExhausted {
            path: record.path.clone(),
            attempts: space.len(),
            reference_len,
            near_misses,
        }
    }
}

/// Canonicalizes and signs one candidate.
fn evaluate(ctx: &MacContext, record: &PathMacRecord, candidate: Candidate<'_>) -> SearchResult {
    let value = candidate.transform.apply(&record.value);
    let canonical_string = canonicalize(&value, candidate.policy);
    let path_used = candidate.path_variant.apply(&record.path);
    let computed_mac = compute_mac(ctx, &path_used, &canonical_string);
    SearchResult {
        matched: computed_mac == record.expected_mac,
        policy: candidate.policy.clone(),
        value_variant: candidate.transform.clone(),
        path_variant: candidate.path_variant,
        path_used,
        canonical_string,
        computed_mac,
        hypothesis_index: candidate.index,
    }
}

fn signed_delta(len: usize, reference: usize) -> i64 {
    let magnitude = i64::try_from(len.abs_diff(reference)).unwrap_or(i64::MAX);
    if len >= reference { magnitude } else { -magnitude }
}
