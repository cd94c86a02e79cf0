//! Presentation helpers: media references and playback offsets for results

use crate::config::PresentationConfig;
use crate::retrieval::ResultItem;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Seconds of lead-in before the keyframe when starting playback
const PLAYBACK_LEAD_IN_SECS: f64 = 0.5;

/// Playback start, in seconds, for a keyframe.
///
/// Starts slightly before the keyframe, clamped at the start of the video.
pub fn playback_offset(keyframe_index: u64, frame_rate: f64) -> f64 {
    (keyframe_index as f64 / frame_rate - PLAYBACK_LEAD_IN_SECS).max(0.0)
}

pub fn keyframe_path(keyframes_dir: &Path, video_id: &str, keyframe_index: u64) -> PathBuf {
    keyframes_dir
        .join(video_id)
        .join(format!("keyframe_{}.webp", keyframe_index))
}

pub fn video_path(videos_dir: &Path, video_id: &str) -> PathBuf {
    videos_dir.join(format!("{}.mp4", video_id))
}

/// A result item with its media references resolved
#[derive(Debug, Clone, Serialize)]
pub struct PresentedItem {
    #[serde(flatten)]
    pub item: ResultItem,
    pub image: PathBuf,
    pub video: PathBuf,
    pub start_seconds: f64,
}

impl PresentedItem {
    pub fn new(item: ResultItem, config: &PresentationConfig) -> Self {
        let image = keyframe_path(&config.keyframes_dir, &item.video_id, item.keyframe_index);
        let video = video_path(&config.videos_dir, &item.video_id);
        let start_seconds = playback_offset(item.keyframe_index, config.frame_rate);

        Self {
            item,
            image,
            video,
            start_seconds,
        }
    }
}
