//! Keyframe identity and object-detection records
//!
//! A keyframe is identified by `(video_id, keyframe_index)`. Its detection
//! record is the multiset of objects an external detector recognised in it.

mod filter;

pub use filter::{evaluate, passes, LabelGroups};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity key of a keyframe, globally unique.
///
/// The derived ordering compares `video_id` lexicographically, then
/// `keyframe_index` numerically. Fusion uses it as the tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyframeKey {
    pub video_id: String,
    pub keyframe_index: u64,
}

impl KeyframeKey {
    pub fn new(video_id: impl Into<String>, keyframe_index: u64) -> Self {
        Self {
            video_id: video_id.into(),
            keyframe_index,
        }
    }
}

impl fmt::Display for KeyframeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.video_id, self.keyframe_index)
    }
}

/// One detected object occurrence in a keyframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedInstance {
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
}

impl DetectedInstance {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Stored detection record for one keyframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeRecord {
    pub key: KeyframeKey,
    #[serde(default)]
    pub detections: Vec<DetectedInstance>,
}

impl KeyframeRecord {
    pub fn new(key: KeyframeKey, detections: Vec<DetectedInstance>) -> Self {
        Self { key, detections }
    }
}
