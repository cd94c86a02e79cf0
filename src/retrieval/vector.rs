//! Vector signal: text encoder plus nearest-neighbour search

use crate::backends::{TextEncoder, VectorBackend};
use crate::query::Query;
use crate::retrieval::{SourceError, SourceHits, SourceKind};
use std::sync::Arc;

pub struct VectorSignalAdapter {
    encoder: Arc<dyn TextEncoder>,
    index: Arc<dyn VectorBackend>,
    top_n: usize,
}

impl VectorSignalAdapter {
    pub fn new(encoder: Arc<dyn TextEncoder>, index: Arc<dyn VectorBackend>, top_n: usize) -> Self {
        Self {
            encoder,
            index,
            top_n,
        }
    }

    /// The vector signal only exists for queries with text
    pub fn is_active(&self, query: &Query) -> bool {
        query.has_text()
    }

    /// Ordered vector hits, rank 1 = smallest distance, at most `top_n`.
    ///
    /// `raw_score` carries the distance unchanged.
    pub async fn retrieve(&self, query: &Query) -> Result<SourceHits, SourceError> {
        if !self.is_active(query) {
            return Ok(SourceHits::empty(SourceKind::Vector));
        }

        let unavailable = |reason: String| SourceError::Unavailable {
            kind: SourceKind::Vector,
            reason,
        };

        let embedding = self
            .encoder
            .encode(query.description())
            .await
            .map_err(|e| unavailable(format!("encoder failed: {}", e)))?;

        if embedding.len() != self.index.dimension() {
            return Err(unavailable(format!(
                "encoder produced {} dimensions, index expects {}",
                embedding.len(),
                self.index.dimension()
            )));
        }

        let mut scored = self
            .index
            .nearest(&embedding, self.top_n)
            .await
            .map_err(|e| unavailable(format!("vector index failed: {}", e)))?;

        // Indices return approximate order; missing distances sort last
        scored.sort_by(|a, b| {
            let a = a.score.unwrap_or(f32::INFINITY);
            let b = b.score.unwrap_or(f32::INFINITY);
            a.total_cmp(&b)
        });

        Ok(SourceHits::from_ranked(SourceKind::Vector, scored, self.top_n))
    }
}
