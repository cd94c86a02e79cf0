use std::path::PathBuf;
use thiserror::Error;

/// Main error type for framefind
#[derive(Error, Debug)]
pub enum FramefindError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Detection store errors
    #[error("Detection store error: {0}")]
    DetectionDb(#[from] crate::backends::DetectionDbError),

    /// Keyword index errors
    #[error("Keyword index error: {0}")]
    KeywordIndex(#[from] crate::backends::KeywordIndexError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] crate::backends::VectorIndexError),

    /// Text encoder errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::backends::EmbeddingError),

    /// Query execution errors
    #[error(transparent)]
    Search(#[from] crate::retrieval::SearchError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A single validation failure, tagged with the path of the offending field.
///
/// Shared by configuration validation (`retrieval.rrf_k`) and query validation
/// (`objects[1].confidence`).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Path to the key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result type for framefind operations
pub type Result<T> = std::result::Result<T, FramefindError>;
