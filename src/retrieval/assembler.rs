//! Result assembly: detection filtering and presentation ordering

use crate::detection::{passes, DetectedInstance, KeyframeKey};
use crate::query::ObjectConstraint;
use crate::retrieval::FusedResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One keyframe in the response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub video_id: String,
    pub keyframe_index: u64,
    /// Vector distance; lower is more similar
    pub clip_score: Option<f32>,
    pub rrf_score: f64,
}

impl ResultItem {
    pub fn key(&self) -> KeyframeKey {
        KeyframeKey::new(self.video_id.clone(), self.keyframe_index)
    }

    fn cmp_key(&self, other: &Self) -> Ordering {
        self.video_id
            .cmp(&other.video_id)
            .then(self.keyframe_index.cmp(&other.keyframe_index))
    }
}

impl From<FusedResult> for ResultItem {
    fn from(fused: FusedResult) -> Self {
        Self {
            video_id: fused.key.video_id,
            keyframe_index: fused.key.keyframe_index,
            clip_score: fused.clip_score,
            rrf_score: fused.rrf_score,
        }
    }
}

/// Presentation ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Fused score, best first
    #[default]
    Rrf,
    /// Vector distance, closest first
    Clip,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rrf" => Ok(SortKey::Rrf),
            "clip" => Ok(SortKey::Clip),
            other => Err(format!("Unknown sort key '{}', expected rrf or clip", other)),
        }
    }
}

/// Filtered results in fused order, re-sortable for presentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssembledResults {
    items: Vec<ResultItem>,
}

impl AssembledResults {
    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ResultItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reorder in place. Missing clip scores sink to the bottom; exact ties
    /// fall back to the fused score and then the keyframe key.
    pub fn sort_by(&mut self, sort: SortKey) {
        match sort {
            SortKey::Rrf => self
                .items
                .sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score).then_with(|| a.cmp_key(b))),
            SortKey::Clip => self.items.sort_by(|a, b| {
                let da = a.clip_score.unwrap_or(f32::INFINITY);
                let db = b.clip_score.unwrap_or(f32::INFINITY);
                da.total_cmp(&db)
                    .then_with(|| b.rrf_score.total_cmp(&a.rrf_score))
                    .then_with(|| a.cmp_key(b))
            }),
        }
    }

    /// A re-sorted copy; the original order is kept
    pub fn resorted(&self, sort: SortKey) -> Self {
        let mut copy = self.clone();
        copy.sort_by(sort);
        copy
    }
}

/// Filter fused candidates by their detection records.
///
/// Fused order is preserved. A candidate without a record fails whenever there
/// are constraints. `limit` truncates after filtering.
pub fn assemble(
    fused: Vec<FusedResult>,
    records: &HashMap<KeyframeKey, Vec<DetectedInstance>>,
    constraints: &[ObjectConstraint],
    limit: Option<usize>,
) -> AssembledResults {
    let candidates = fused.len();

    let items: Vec<ResultItem> = fused
        .into_iter()
        .filter(|result| {
            passes(
                records.get(&result.key).map(Vec::as_slice),
                constraints,
            )
        })
        .take(limit.unwrap_or(usize::MAX))
        .map(ResultItem::from)
        .collect();

    tracing::debug!(
        "Detection filter kept {} of {} candidates",
        items.len(),
        candidates
    );

    AssembledResults { items }
}
