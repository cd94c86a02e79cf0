//! Configuration management for framefind
//!
//! Loads the TOML configuration, applies environment and profile overrides and
//! validates the result before anything is opened.

use crate::error::{FramefindError, Result};
use crate::retrieval::{EmptyDescriptionPolicy, DEFAULT_RRF_K};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Schema version written by `config init`
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Query-time retrieval and fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF smoothing constant
    pub rrf_k: f64,
    /// Hits kept per source before fusion
    pub top_n: usize,
    /// Deadline for one query, retrieval and detection lookup together
    pub timeout_ms: u64,
    /// Send label and audio clauses to the keyword index
    pub keyword_pushdown: bool,
    pub empty_description: EmptyDescriptionPolicy,
    pub hnsw_ef_search: usize,
    /// Results returned when the caller gives no limit
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            top_n: 200,
            timeout_ms: 5000,
            keyword_pushdown: true,
            empty_description: EmptyDescriptionPolicy::Listing,
            hnsw_ef_search: 64,
            default_limit: 100,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

fn default_max_elements() -> usize {
    100_000
}

/// Where result media lives and how keyframe indices map to time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub frame_rate: f64,
    pub keyframes_dir: PathBuf,
    pub videos_dir: PathBuf,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            frame_rate: 25.0,
            keyframes_dir: PathBuf::from("~/.framefind/keyframes"),
            videos_dir: PathBuf::from("~/.framefind/videos"),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_pushdown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hnsw_ef_search: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FramefindError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FramefindError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FramefindError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            FramefindError::Config(format!("Unknown profile: {}", profile))
        })?;

        if let Some(top_n) = overrides.top_n {
            self.retrieval.top_n = top_n;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.retrieval.timeout_ms = timeout_ms;
        }
        if let Some(rrf_k) = overrides.rrf_k {
            self.retrieval.rrf_k = rrf_k;
        }
        if let Some(pushdown) = overrides.keyword_pushdown {
            self.retrieval.keyword_pushdown = pushdown;
        }
        if let Some(ef_search) = overrides.hnsw_ef_search {
            self.retrieval.hnsw_ef_search = ef_search;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FRAMEFIND_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `FRAMEFIND_`-prefixed overrides from any variable source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("FRAMEFIND_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_value(path, value)?,
            "RETRIEVAL__TOP_N" => self.retrieval.top_n = parse_value(path, value)?,
            "RETRIEVAL__TIMEOUT_MS" => self.retrieval.timeout_ms = parse_value(path, value)?,
            "RETRIEVAL__KEYWORD_PUSHDOWN" => {
                self.retrieval.keyword_pushdown = parse_value(path, value)?
            }
            "RETRIEVAL__EMPTY_DESCRIPTION" => {
                self.retrieval.empty_description = match value.to_ascii_lowercase().as_str() {
                    "listing" => EmptyDescriptionPolicy::Listing,
                    "empty" => EmptyDescriptionPolicy::Empty,
                    _ => {
                        return Err(FramefindError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Expected 'listing' or 'empty', got '{}'", value),
                        })
                    }
                }
            }
            "RETRIEVAL__DEFAULT_LIMIT" => self.retrieval.default_limit = parse_value(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "PRESENTATION__FRAME_RATE" => self.presentation.frame_rate = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| FramefindError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("framefind").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| FramefindError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".framefind"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| FramefindError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                top_n: Some(50),
                timeout_ms: Some(1500),
                hnsw_ef_search: Some(32),
                ..Default::default()
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.framefind"),
            },
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                model: "clip-ViT-B-32".to_string(),
            },
            indexing: IndexingConfig {
                vector_dim: 512,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                max_elements: default_max_elements(),
            },
            presentation: PresentationConfig::default(),
            profiles,
        }
    }
}
