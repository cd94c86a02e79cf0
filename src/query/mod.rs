//! Query model and validation
//!
//! `RawQuery` is the request shape accepted from callers. `Query::validate`
//! turns it into a canonical, immutable `Query` or reports every violation.

mod validation;

pub use validation::validate;

use crate::error::ValidationError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw per-object constraint as submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObjectConstraint {
    pub label: String,

    /// Minimum detector confidence for an instance to count
    #[serde(default)]
    pub confidence: f64,

    #[serde(default = "default_min_instances")]
    pub min_instances: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<i64>,
}

fn default_min_instances() -> i64 {
    1
}

impl RawObjectConstraint {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            min_instances: default_min_instances(),
            max_instances: None,
        }
    }

    pub fn with_min(mut self, min_instances: i64) -> Self {
        self.min_instances = min_instances;
        self
    }

    pub fn with_max(mut self, max_instances: i64) -> Self {
        self.max_instances = Some(max_instances);
        self
    }
}

/// Raw query submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuery {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub objects: Vec<RawObjectConstraint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl RawQuery {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_object(mut self, object: RawObjectConstraint) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = Some(audio.into());
        self
    }

    /// Read a JSON request file
    pub fn from_json_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?;
        let raw = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse request file {}", path.display()))?;
        Ok(raw)
    }
}

/// Validated object-presence constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConstraint {
    pub label: String,
    pub confidence_threshold: f32,
    pub min_instances: u32,
    pub max_instances: Option<u32>,
}

impl ObjectConstraint {
    /// Whether `count` qualifying instances satisfy the cardinality bounds
    pub fn admits(&self, count: usize) -> bool {
        let count = count as u64;
        if count < u64::from(self.min_instances) {
            return false;
        }
        match self.max_instances {
            Some(max) => count <= u64::from(max),
            None => true,
        }
    }

    /// Whether every passing keyframe must contain this label at least once.
    ///
    /// Only such constraints can be pushed down to an index as a
    /// label-presence clause without dropping passing keyframes.
    pub fn requires_presence(&self) -> bool {
        self.min_instances >= 1
    }
}

/// Canonical validated query.
///
/// Constraints are unique by label and sorted by label. Fields are private so a
/// `Query` can only come out of validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    description: String,
    objects: Vec<ObjectConstraint>,
    audio_tag: Option<String>,
}

impl Query {
    /// Validate a raw query, collecting every violation
    pub fn validate(raw: &RawQuery) -> Result<Self, Vec<ValidationError>> {
        validate(raw)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// True when the description carries no text signal
    pub fn has_text(&self) -> bool {
        !self.description.is_empty()
    }

    pub fn objects(&self) -> &[ObjectConstraint] {
        &self.objects
    }

    pub fn audio_tag(&self) -> Option<&str> {
        self.audio_tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramefindError;
    use tempfile::TempDir;

    #[test]
    fn test_request_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"description": "dog running", "objects": [{"label": "dog", "confidence": 0.5}]}"#,
        )
        .unwrap();

        let raw = RawQuery::from_json_file(&path).unwrap();
        assert_eq!(raw.description, "dog running");
        assert_eq!(raw.objects[0].min_instances, 1);
        assert_eq!(raw.audio, None);
    }

    #[test]
    fn test_request_file_errors_carry_context() {
        let temp = TempDir::new().unwrap();

        let missing = temp.path().join("missing.json");
        let err = RawQuery::from_json_file(&missing).unwrap_err();
        assert!(matches!(err, FramefindError::Other(_)));
        assert!(err.to_string().contains("Failed to read request file"));

        let malformed = temp.path().join("bad.json");
        std::fs::write(&malformed, "{ not json").unwrap();
        let err = RawQuery::from_json_file(&malformed).unwrap_err();
        assert!(err.to_string().contains("Failed to parse request file"));
    }
}
