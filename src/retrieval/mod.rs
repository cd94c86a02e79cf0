//! Retrieval fusion engine
//!
//! Runs keyword and vector retrieval concurrently, merges the two rankings with
//! Reciprocal Rank Fusion and filters the fused candidates against the query's
//! object constraints.

mod assembler;
mod deduplication;
mod engine;
mod fusion;
mod keyword;
mod vector;

pub use assembler::{assemble, AssembledResults, ResultItem, SortKey};
pub use deduplication::dedupe_ranked;
pub use engine::RetrievalEngine;
pub use fusion::{
    reciprocal_rank_fusion, rrf_term, FusedResult, FusionConfig, FusionError, DEFAULT_RRF_K,
};
pub use keyword::{EmptyDescriptionPolicy, KeywordSignalAdapter};
pub use vector::VectorSignalAdapter;

use crate::backends::ScoredKey;
use crate::detection::KeyframeKey;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Retrieval signal a hit list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Keyword,
    Vector,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Keyword => write!(f, "keyword"),
            SourceKind::Vector => write!(f, "vector"),
        }
    }
}

/// One entry of a source's ordered result list
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub key: KeyframeKey,
    /// 1-based position in the source's list
    pub rank: u32,
    /// Signal-specific score (relevance or distance), if the source has one
    pub raw_score: Option<f32>,
}

/// Ordered hits of a single source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceHits {
    pub source: SourceKind,
    pub hits: Vec<RetrievalHit>,
}

impl SourceHits {
    pub fn empty(source: SourceKind) -> Self {
        Self {
            source,
            hits: Vec::new(),
        }
    }

    /// Rank an index's ordered output: duplicates dropped, truncated to `top_n`,
    /// ranks assigned 1..
    pub fn from_ranked(source: SourceKind, scored: Vec<ScoredKey>, top_n: usize) -> Self {
        let hits = dedupe_ranked(scored)
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(i, scored)| RetrievalHit {
                key: scored.key,
                rank: i as u32 + 1,
                raw_score: scored.score,
            })
            .collect();

        Self { source, hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A retrieval source that could not contribute to a query
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum SourceError {
    #[error("{kind} source unavailable: {reason}")]
    Unavailable { kind: SourceKind, reason: String },

    #[error("{kind} source timed out after {elapsed_ms} ms")]
    TimedOut { kind: SourceKind, elapsed_ms: u64 },
}

impl SourceError {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceError::Unavailable { kind, .. } | SourceError::TimedOut { kind, .. } => *kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {}", format_validation_errors(.errors))]
    InvalidQuery { errors: Vec<ValidationError> },

    #[error("All retrieval sources failed: {}", format_source_errors(.failures))]
    TotalRetrievalFailure { failures: Vec<SourceError> },

    #[error("Detection store unavailable: {0}")]
    DetectionStoreUnavailable(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error(transparent)]
    Fusion(#[from] FusionError),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_source_errors(failures: &[SourceError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// How completely a query was answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchStatus {
    /// Every invoked source contributed
    Complete,
    /// Some sources failed; results come from the rest
    Partial { unavailable: Vec<SourceError> },
    /// No description and no usable listing; nothing was retrieved
    NoTextSignal,
}

/// Result of one search request
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query_id: Uuid,
    #[serde(flatten)]
    pub status: SearchStatus,
    pub results: AssembledResults,
}

impl SearchOutcome {
    pub fn items(&self) -> &[ResultItem] {
        self.results.items()
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, SearchStatus::Partial { .. })
    }
}
