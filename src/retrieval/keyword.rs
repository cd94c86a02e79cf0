//! Keyword signal: lexical retrieval with pushed-down filter clauses

use crate::backends::{KeywordBackend, KeywordRequest};
use crate::query::Query;
use crate::retrieval::{SourceError, SourceHits, SourceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the keyword signal does for a query without a description
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyDescriptionPolicy {
    /// Ask the index for an unscored listing narrowed by the query's filters
    #[default]
    Listing,
    /// Retrieve nothing
    Empty,
}

pub struct KeywordSignalAdapter {
    backend: Arc<dyn KeywordBackend>,
    top_n: usize,
    pushdown: bool,
    empty_policy: EmptyDescriptionPolicy,
}

impl KeywordSignalAdapter {
    pub fn new(
        backend: Arc<dyn KeywordBackend>,
        top_n: usize,
        pushdown: bool,
        empty_policy: EmptyDescriptionPolicy,
    ) -> Self {
        Self {
            backend,
            top_n,
            pushdown,
            empty_policy,
        }
    }

    /// Translate a query into an index request, or `None` when the index
    /// should not be contacted.
    ///
    /// A label clause is only emitted for constraints that require the label
    /// to be present, so pushdown never drops a keyframe the detection filter
    /// would accept. Confidence and cardinality stay with the detection filter.
    pub fn build_request(&self, query: &Query) -> Option<KeywordRequest> {
        let text = if query.has_text() {
            Some(query.description().to_string())
        } else if self.empty_policy == EmptyDescriptionPolicy::Listing
            && !query.objects().is_empty()
            && self.backend.supports_listing()
        {
            None
        } else {
            return None;
        };

        let mut request = KeywordRequest {
            text,
            ..Default::default()
        };

        if self.pushes_down() {
            request.required_labels = query
                .objects()
                .iter()
                .filter(|c| c.requires_presence())
                .map(|c| c.label.clone())
                .collect();
            request.audio_tag = query.audio_tag().map(str::to_string);
        }

        Some(request)
    }

    fn pushes_down(&self) -> bool {
        self.pushdown && self.backend.supports_filters()
    }

    /// Filter clauses of `query` that the index will not receive.
    ///
    /// Required labels are still enforced by the detection filter. An audio
    /// tag has no other consumer, so an unpushed tag is ignored.
    pub fn unpushed_filters<'q>(&self, query: &'q Query) -> (Vec<&'q str>, Option<&'q str>) {
        if self.pushes_down() {
            return (Vec::new(), None);
        }

        let labels = query
            .objects()
            .iter()
            .filter(|c| c.requires_presence())
            .map(|c| c.label.as_str())
            .collect();
        (labels, query.audio_tag())
    }

    /// Whether `retrieve` would contact the index for this query
    pub fn is_active(&self, query: &Query) -> bool {
        self.build_request(query).is_some()
    }

    /// Ordered keyword hits, rank 1 = best match, at most `top_n`
    pub async fn retrieve(&self, query: &Query) -> Result<SourceHits, SourceError> {
        let Some(request) = self.build_request(query) else {
            return Ok(SourceHits::empty(SourceKind::Keyword));
        };

        let (labels, audio_tag) = self.unpushed_filters(query);
        if let Some(tag) = audio_tag {
            tracing::warn!(audio = tag, "Keyword index cannot filter by audio tag; ignoring it");
        }
        if !labels.is_empty() {
            tracing::debug!(
                labels = ?labels,
                "Label clauses not pushed down; detection filter still applies them"
            );
        }

        tracing::debug!(
            listing = request.is_listing(),
            labels = request.required_labels.len(),
            audio = request.audio_tag.is_some(),
            "Keyword search"
        );

        let scored = self
            .backend
            .search(&request, self.top_n)
            .await
            .map_err(|e| SourceError::Unavailable {
                kind: SourceKind::Keyword,
                reason: e.to_string(),
            })?;

        Ok(SourceHits::from_ranked(SourceKind::Keyword, scored, self.top_n))
    }
}
