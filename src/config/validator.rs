use crate::backends::resolve_model;
use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{FramefindError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let errors = Self::collect_errors(config);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FramefindError::ConfigValidation { errors })
        }
    }

    /// Every violation in the configuration
    pub fn collect_errors(config: &Config) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate storage settings
        Self::validate_storage(config, &mut errors);

        // Validate retrieval settings
        Self::validate_retrieval(config, &mut errors);

        // Validate embedding settings against the index
        Self::validate_embedding(config, &mut errors);

        // Validate indexing settings
        Self::validate_indexing(config, &mut errors);

        // Validate presentation settings
        Self::validate_presentation(config, &mut errors);

        errors
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if !retrieval.rrf_k.is_finite() || retrieval.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be finite and greater than 0, got {}", retrieval.rrf_k),
            ));
        }

        if retrieval.top_n == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_n",
                "top_n must be greater than 0",
            ));
        }

        if retrieval.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if retrieval.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if retrieval.default_limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_limit",
                "Default limit must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let model = &config.embedding.model;

        if model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
            return;
        }

        match resolve_model(model) {
            None => errors.push(ValidationError::new(
                "embedding.model",
                format!("Unsupported model: {}", model),
            )),
            Some((_, dimension)) if dimension != config.indexing.vector_dim => {
                errors.push(ValidationError::new(
                    "indexing.vector_dim",
                    format!(
                        "Model {} produces {} dimensions but the index expects {}",
                        model, dimension, config.indexing.vector_dim
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        // Validate vector_dim
        if config.indexing.vector_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        // Validate HNSW parameters
        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_presentation(config: &Config, errors: &mut Vec<ValidationError>) {
        let frame_rate = config.presentation.frame_rate;
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            errors.push(ValidationError::new(
                "presentation.frame_rate",
                format!("Frame rate must be greater than 0, got {}", frame_rate),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(config: &Config) -> Vec<String> {
        ConfigValidator::collect_errors(config)
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::new();
        assert_eq!(paths(&config), vec!["storage.data_dir"]);
    }

    #[test]
    fn test_invalid_rrf_k() {
        for k in [0.0, -5.0, f64::NAN] {
            let mut config = Config::default();
            config.retrieval.rrf_k = k;
            assert_eq!(paths(&config), vec!["retrieval.rrf_k"]);
        }
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.retrieval.top_n = 0;
        config.retrieval.timeout_ms = 0;
        config.presentation.frame_rate = 0.0;

        match ConfigValidator::validate(&config) {
            Err(FramefindError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_model_dimension_mismatch() {
        let mut config = Config::default();
        config.embedding.model = "all-MiniLM-L6-v2".to_string();
        assert_eq!(paths(&config), vec!["indexing.vector_dim"]);

        config.indexing.vector_dim = 384;
        assert!(paths(&config).is_empty());
    }

    #[test]
    fn test_unknown_model() {
        let mut config = Config::default();
        config.embedding.model = "invalid".to_string();
        assert_eq!(paths(&config), vec!["embedding.model"]);
    }
}
