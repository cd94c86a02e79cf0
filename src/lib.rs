//! framefind - video keyframe retrieval
//!
//! Finds keyframes by combining a free-text description, object-presence
//! constraints over detector output and an optional audio tag. Keyword and
//! vector retrieval run concurrently and are merged with Reciprocal Rank
//! Fusion before per-keyframe detection filtering.

pub mod backends;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod presentation;
pub mod query;
pub mod retrieval;

pub use error::{FramefindError, Result};
