//! Reciprocal Rank Fusion algorithm for combining ranked keyframe lists

use crate::detection::KeyframeKey;
use crate::retrieval::{SourceHits, SourceKind};
use std::collections::HashMap;
use thiserror::Error;

/// Default RRF smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be finite and positive")]
    InvalidK(f64),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    rrf_k: f64,
}

impl FusionConfig {
    pub fn new(rrf_k: f64) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k <= 0.0 {
            return Err(FusionError::InvalidK(rrf_k));
        }
        Ok(Self { rrf_k })
    }

    pub fn rrf_k(&self) -> f64 {
        self.rrf_k
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// A keyframe after fusion, with each source's contribution retained
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub key: KeyframeKey,
    pub rrf_score: f64,
    /// Raw vector distance; lower is more similar
    pub clip_score: Option<f32>,
    pub keyword_rank: Option<u32>,
    pub vector_rank: Option<u32>,
    pub keyword_score: Option<f32>,
}

impl FusedResult {
    fn new(key: KeyframeKey) -> Self {
        Self {
            key,
            rrf_score: 0.0,
            clip_score: None,
            keyword_rank: None,
            vector_rank: None,
            keyword_score: None,
        }
    }

    /// Number of sources that returned this keyframe
    pub fn source_count(&self) -> usize {
        self.keyword_rank.is_some() as usize + self.vector_rank.is_some() as usize
    }
}

/// Reciprocal-rank contribution of one source position
pub fn rrf_term(rrf_k: f64, rank: u32) -> f64 {
    debug_assert!(rank >= 1, "ranks are 1-based");
    1.0 / (rrf_k + f64::from(rank))
}

/// Apply Reciprocal Rank Fusion to any number of ranked lists
///
/// RRF formula: score(key) = sum over all sources containing key of 1 / (k + rank)
///
/// Keys missing from a source get no contribution from it. Contributions are
/// summed in source order (keyword, then vector) whatever order the lists are
/// passed in, so the result does not depend on argument order.
///
/// # Returns
/// One result per distinct key, sorted by score descending, then key ascending
pub fn reciprocal_rank_fusion(sources: &[SourceHits], config: &FusionConfig) -> Vec<FusedResult> {
    let mut ordered: Vec<&SourceHits> = sources.iter().collect();
    ordered.sort_by_key(|s| s.source);

    let mut fused: HashMap<&KeyframeKey, FusedResult> = HashMap::new();

    for source in ordered {
        for hit in &source.hits {
            let entry = fused
                .entry(&hit.key)
                .or_insert_with(|| FusedResult::new(hit.key.clone()));

            // Repeated keys within one source only count at their best rank
            let rank_slot = match source.source {
                SourceKind::Keyword => &mut entry.keyword_rank,
                SourceKind::Vector => &mut entry.vector_rank,
            };
            if rank_slot.is_some() {
                continue;
            }
            *rank_slot = Some(hit.rank);

            match source.source {
                SourceKind::Keyword => entry.keyword_score = hit.raw_score,
                SourceKind::Vector => entry.clip_score = hit.raw_score,
            }

            entry.rrf_score += rrf_term(config.rrf_k, hit.rank);
        }
    }

    let mut results: Vec<FusedResult> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.rrf_score
            .total_cmp(&a.rrf_score)
            .then_with(|| a.key.cmp(&b.key))
    });

    tracing::debug!("Fused {} sources into {} candidates", sources.len(), results.len());

    results
}
