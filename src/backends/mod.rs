//! Retrieval collaborators
//!
//! The engine talks to four external services through the traits below:
//! a keyword index, a text encoder, a vector index and a detection metadata
//! store. Local implementations are provided so the engine can run end to end:
//! - Tantivy for keyword search (BM25, filter pushdown, unscored listing)
//! - FastEmbed for text encoding (CLIP ViT-B/32 text tower by default)
//! - HNSW for nearest-neighbour search over keyframe embeddings
//! - SQLite for detection records and persisted keyframe vectors
mod detection_db;
mod encoder;
mod keyword_index;
mod vector_index;

pub use detection_db::{DetectionDb, DetectionDbError, DetectionDbStats};
pub use encoder::{resolve_model, EmbeddingError, FastEmbedEncoder, SUPPORTED_MODELS};
pub use keyword_index::{KeyframeDocument, KeywordIndex, KeywordIndexError};
pub use vector_index::{VectorIndex, VectorIndexError};

use crate::config::Config;
use crate::detection::{DetectedInstance, KeyframeKey};
use crate::error::{FramefindError, Result};
use crate::retrieval::RetrievalEngine;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Failure of an external collaborator, as seen by the engine
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackendError::TaskFailed(e.to_string())
    }
}

/// A key returned by an index, in the index's own order
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKey {
    pub key: KeyframeKey,
    /// Index-specific score; `None` for unscored listings
    pub score: Option<f32>,
}

impl ScoredKey {
    pub fn new(key: KeyframeKey, score: Option<f32>) -> Self {
        Self { key, score }
    }
}

/// Keyword index request built from a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordRequest {
    /// Free text; `None` requests the index's default listing
    pub text: Option<String>,
    /// Labels every returned keyframe must contain
    pub required_labels: Vec<String>,
    /// Audio tag every returned keyframe must carry
    pub audio_tag: Option<String>,
}

impl KeywordRequest {
    pub fn is_listing(&self) -> bool {
        self.text.is_none()
    }

    pub fn has_filters(&self) -> bool {
        !self.required_labels.is_empty() || self.audio_tag.is_some()
    }
}

/// Lexical relevance retrieval over keyframe metadata
#[async_trait]
pub trait KeywordBackend: Send + Sync {
    /// Ordered hits, best first, at most `limit`
    async fn search(
        &self,
        request: &KeywordRequest,
        limit: usize,
    ) -> std::result::Result<Vec<ScoredKey>, BackendError>;

    /// Whether label/audio clauses can be evaluated by the index
    fn supports_filters(&self) -> bool {
        false
    }

    /// Whether a request without text yields a default listing
    fn supports_listing(&self) -> bool {
        false
    }
}

/// Maps text to a fixed-dimension embedding
#[async_trait]
pub trait TextEncoder: Send + Sync {
    async fn encode(&self, text: &str) -> std::result::Result<Vec<f32>, BackendError>;

    fn dimension(&self) -> usize;
}

/// Nearest-neighbour search over keyframe embeddings
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Ordered hits, smallest distance first; `score` carries the distance
    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> std::result::Result<Vec<ScoredKey>, BackendError>;

    fn dimension(&self) -> usize;
}

/// Batched lookup of detection records
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// Detections for every known key; unknown keys are absent from the map
    async fn fetch_batch(
        &self,
        keys: &[KeyframeKey],
    ) -> std::result::Result<HashMap<KeyframeKey, Vec<DetectedInstance>>, BackendError>;
}

/// Local backends opened from a data directory
pub struct LocalBackends {
    pub keyword_index: KeywordIndex,
    pub vector_index: VectorIndex,
    pub detection_db: DetectionDb,
    pub encoder: Option<FastEmbedEncoder>,
}

impl LocalBackends {
    /// Open all local stores below `data_dir` and load the encoder
    pub fn open(config: &Config, data_dir: &Path) -> Result<Self> {
        let mut backends = Self::open_stores(config, data_dir)?;
        backends.encoder = Some(FastEmbedEncoder::new(&config.embedding.model)?);
        Ok(backends)
    }

    /// Open the on-disk stores without loading an embedding model
    pub fn open_stores(config: &Config, data_dir: &Path) -> Result<Self> {
        let store = Self::store_dir(data_dir);
        std::fs::create_dir_all(&store).map_err(|e| FramefindError::Io {
            source: e,
            context: format!("Failed to create store directory: {}", store.display()),
        })?;

        let keyword_index = KeywordIndex::new(store.join("keywords"))?;
        let detection_db = DetectionDb::new(&store.join("framefind.sqlite"))?;

        let vectors = detection_db.load_vectors(&config.embedding.model)?;
        let vector_index = VectorIndex::from_vectors(
            config.indexing.vector_dim,
            config.indexing.hnsw_m,
            config.indexing.hnsw_ef_construction,
            config.indexing.max_elements.max(vectors.len()),
            config.retrieval.hnsw_ef_search,
            vectors,
        )?;

        tracing::info!(
            "Opened local stores at {} ({} keyword docs, {} vectors)",
            store.display(),
            keyword_index.len(),
            vector_index.len()
        );

        Ok(Self {
            keyword_index,
            vector_index,
            detection_db,
            encoder: None,
        })
    }

    /// Location of the machine-managed store below a data directory
    pub fn store_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("store")
    }

    /// Build a retrieval engine over these backends
    pub fn into_engine(self, config: &Config) -> Result<RetrievalEngine> {
        let encoder = self.encoder.ok_or_else(|| {
            FramefindError::Config("Text encoder not loaded; use LocalBackends::open".to_string())
        })?;

        let engine = RetrievalEngine::new(
            Arc::new(self.keyword_index),
            Arc::new(encoder),
            Arc::new(self.vector_index),
            Arc::new(self.detection_db),
            &config.retrieval,
        )?;
        Ok(engine)
    }
}
