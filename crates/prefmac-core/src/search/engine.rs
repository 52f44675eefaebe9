//! Parallel candidate evaluation.
//!
//! Workers claim indices from a shared counter in increasing order and
//! publish matches with `fetch_min`. A worker stops once its claimed index
//! is above the best match. Every index below the final best match was
//! claimed before any index above it, so the reported match is the lowest
//! matching index no matter how the workers interleave.

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use super::space::SearchSpace;
use crate::canonical::canonicalize;
use crate::mac::{MacContext, MacTag, compute_mac};
use crate::record::PathMacRecord;
use crate::value::{DottedPath, PrefValue};

const NO_MATCH: usize = usize::MAX;

pub(super) struct Outcome {
    /// Lowest matching candidate index.
    pub best: Option<usize>,
    /// Canonical length for each candidate index. Complete only when
    /// `best` is `None`.
    pub lengths: Vec<usize>,
    /// `(candidate, peer)` pairs where a candidate reproduced a peer's MAC,
    /// ordered by candidate index.
    pub confusions: Vec<(usize, usize)>,
}

#[derive(Default)]
struct Shard {
    lengths: Vec<(usize, usize)>,
    confusions: Vec<(usize, usize)>,
}

pub(super) fn run(
    ctx: &MacContext,
    record: &PathMacRecord,
    space: &SearchSpace,
    peer_tags: &[(&DottedPath, MacTag)],
    workers: usize,
) -> Outcome {
    let total = space.len();
    let values: Vec<Cow<'_, PrefValue>> = space
        .transforms()
        .iter()
        .map(|transform| transform.apply(&record.value))
        .collect();

    let next = AtomicUsize::new(0);
    let best = AtomicUsize::new(NO_MATCH);
    let workers = workers.clamp(1, total.max(1));

    let worker = || {
        let mut shard = Shard::default();
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            if index >= total || index > best.load(Ordering::Acquire) {
                break;
            }
            let Some(candidate) = space.candidate(index) else {
                break;
            };
            let canonical = canonicalize(&values[candidate.transform_index], candidate.policy);
            let path = candidate.path_variant.apply(&record.path);
            let tag = compute_mac(ctx, &path, &canonical);
            shard.lengths.push((index, canonical.len()));

            if tag == record.expected_mac {
                best.fetch_min(index, Ordering::AcqRel);
            } else if let Some(peer) = peer_tags.iter().position(|(_, peer_tag)| *peer_tag == tag) {
                shard.confusions.push((index, peer));
            }
        }
        shard
    };

    let shards: Vec<Shard> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers).map(|_| scope.spawn(worker)).collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    });

    let mut lengths = vec![0; total];
    let mut confusions = Vec::new();
    for shard in shards {
        for (index, len) in shard.lengths {
            lengths[index] = len;
        }
        confusions.extend(shard.confusions);
    }
    confusions.sort_unstable();

    let best = best.into_inner();
    Outcome {
        best: (best != NO_MATCH).then_some(best),
        lengths,
        confusions,
    }
}
