/// FastEmbed text encoder
use super::{BackendError, TextEncoder};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Models the encoder knows how to load
pub const SUPPORTED_MODELS: &[&str] = &[
    "clip-ViT-B-32",
    "all-MiniLM-L6-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
];

/// Resolve a model name to the FastEmbed model and its dimension
pub fn resolve_model(model_name: &str) -> Option<(EmbeddingModel, usize)> {
    match model_name {
        "clip-ViT-B-32" | "clip-vit-b-32" => Some((EmbeddingModel::ClipVitB32, 512)),
        "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        _ => None,
    }
}

/// FastEmbed encoder for query text
///
/// Keyframes are embedded with the image tower of CLIP ViT-B/32, so queries
/// default to the matching text tower (512 dimensions).
///
/// **Important**: Models are downloaded on first use to the FastEmbed cache.
#[derive(Clone)]
pub struct FastEmbedEncoder {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedEncoder {
    /// Create a new encoder with the specified model
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = resolve_model(model_name).ok_or_else(|| {
            EmbeddingError::InitializationError(format!(
                "Unsupported model: {}. Supported: {}",
                model_name,
                SUPPORTED_MODELS.join(", ")
            ))
        })?;

        tracing::info!(
            "Initializing text encoder: {} ({}D, downloaded if not cached)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create encoder with default model (CLIP ViT-B/32)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("clip-ViT-B-32")
    }

    /// Encode one text
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings.pop().ok_or_else(|| {
            EmbeddingError::GenerationError("No embeddings generated".to_string())
        })?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl TextEncoder for FastEmbedEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let encoder = self.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || encoder.embed(&text))
            .await?
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
