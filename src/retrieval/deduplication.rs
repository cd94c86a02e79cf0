//! Per-source deduplication by keyframe key

use crate::backends::ScoredKey;
use crate::detection::KeyframeKey;
use std::collections::HashSet;

/// Drop repeated keys from an ordered list, keeping the first (best ranked)
/// instance
pub fn dedupe_ranked(hits: Vec<ScoredKey>) -> Vec<ScoredKey> {
    let mut seen: HashSet<KeyframeKey> = HashSet::with_capacity(hits.len());

    hits.into_iter()
        .filter(|hit| seen.insert(hit.key.clone()))
        .collect()
}
