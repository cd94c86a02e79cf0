//! Retrieval engine combining keyword and vector signals

use crate::backends::{DetectionSource, KeywordBackend, TextEncoder, VectorBackend};
use crate::config::RetrievalConfig;
use crate::detection::{DetectedInstance, KeyframeKey};
use crate::query::{Query, RawQuery};
use crate::retrieval::{
    assemble, reciprocal_rank_fusion, AssembledResults, FusionConfig, KeywordSignalAdapter,
    SearchError, SearchOutcome, SearchStatus, SourceError, SourceHits, SourceKind,
    VectorSignalAdapter,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Retrieval engine
///
/// Holds only shared handles to its collaborators and immutable settings, so
/// one engine can serve any number of concurrent queries.
pub struct RetrievalEngine {
    keyword: KeywordSignalAdapter,
    vector: VectorSignalAdapter,
    detections: Arc<dyn DetectionSource>,
    fusion: FusionConfig,
    timeout: Duration,
}

impl RetrievalEngine {
    /// Create a new engine
    pub fn new(
        keyword_backend: Arc<dyn KeywordBackend>,
        encoder: Arc<dyn TextEncoder>,
        vector_backend: Arc<dyn VectorBackend>,
        detections: Arc<dyn DetectionSource>,
        config: &RetrievalConfig,
    ) -> Result<Self, SearchError> {
        let fusion = FusionConfig::new(config.rrf_k)?;

        Ok(Self {
            keyword: KeywordSignalAdapter::new(
                keyword_backend,
                config.top_n,
                config.keyword_pushdown,
                config.empty_description,
            ),
            vector: VectorSignalAdapter::new(encoder, vector_backend, config.top_n),
            detections,
            fusion,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Validate and run a raw request
    pub async fn search(
        &self,
        raw: &RawQuery,
        limit: Option<usize>,
    ) -> Result<SearchOutcome, SearchError> {
        let query = Query::validate(raw).map_err(|errors| SearchError::InvalidQuery { errors })?;
        self.search_query(&query, limit).await
    }

    /// Like `search`, but stops early when `cancel` fires
    pub async fn search_with_cancel(
        &self,
        raw: &RawQuery,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Search cancelled");
                Err(SearchError::Cancelled)
            }
            outcome = self.search(raw, limit) => outcome,
        }
    }

    /// Run a validated query
    pub async fn search_query(
        &self,
        query: &Query,
        limit: Option<usize>,
    ) -> Result<SearchOutcome, SearchError> {
        let query_id = Uuid::new_v4();
        let span = tracing::info_span!("search", %query_id);

        self.run(query, query_id, limit).instrument(span).await
    }

    async fn run(
        &self,
        query: &Query,
        query_id: Uuid,
        limit: Option<usize>,
    ) -> Result<SearchOutcome, SearchError> {
        tracing::info!(
            "Query: {:?} ({} object constraints, audio: {:?})",
            query.description(),
            query.objects().len(),
            query.audio_tag()
        );

        let keyword_active = self.keyword.is_active(query);
        let vector_active = self.vector.is_active(query);

        if !keyword_active && !vector_active {
            tracing::info!("No text signal and no listing available; returning no results");
            return Ok(SearchOutcome {
                query_id,
                status: SearchStatus::NoTextSignal,
                results: AssembledResults::default(),
            });
        }

        let started = Instant::now();
        let deadline = started + self.timeout;

        // Step 1: Concurrent keyword + vector retrieval under one deadline
        let (keyword_result, vector_result) = tokio::join!(
            bounded(SourceKind::Keyword, self.keyword.retrieve(query), started, deadline),
            bounded(SourceKind::Vector, self.vector.retrieve(query), started, deadline)
        );

        let mut invoked = 0;
        let mut failures = Vec::new();
        let mut sources = Vec::with_capacity(2);

        for (kind, active, result) in [
            (SourceKind::Keyword, keyword_active, keyword_result),
            (SourceKind::Vector, vector_active, vector_result),
        ] {
            if !active {
                continue;
            }
            invoked += 1;
            match result {
                Ok(hits) => {
                    tracing::debug!("{} source returned {} hits", kind, hits.len());
                    sources.push(hits);
                }
                Err(e) => {
                    tracing::warn!("Retrieval source degraded: {}", e);
                    failures.push(e);
                }
            }
        }

        if failures.len() == invoked {
            return Err(SearchError::TotalRetrievalFailure { failures });
        }

        // Step 2: Reciprocal Rank Fusion
        let fused = reciprocal_rank_fusion(&sources, &self.fusion);

        // Step 3: One batched detection lookup, only when something is filtered on
        let records = if query.objects().is_empty() {
            HashMap::new()
        } else {
            let keys: Vec<KeyframeKey> = fused.iter().map(|r| r.key.clone()).collect();
            self.fetch_records(&keys, deadline).await?
        };

        // Step 4: Filter and assemble
        let results = assemble(fused, &records, query.objects(), limit);

        let status = if failures.is_empty() {
            SearchStatus::Complete
        } else {
            SearchStatus::Partial {
                unavailable: failures,
            }
        };

        tracing::info!(
            "Query finished in {} ms with {} results{}",
            started.elapsed().as_millis(),
            results.len(),
            if matches!(status, SearchStatus::Partial { .. }) {
                " (partial)"
            } else {
                ""
            }
        );

        Ok(SearchOutcome {
            query_id,
            status,
            results,
        })
    }

    async fn fetch_records(
        &self,
        keys: &[KeyframeKey],
        deadline: Instant,
    ) -> Result<HashMap<KeyframeKey, Vec<DetectedInstance>>, SearchError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        match tokio::time::timeout_at(deadline, self.detections.fetch_batch(keys)).await {
            Ok(Ok(records)) => {
                tracing::debug!("Fetched {} detection records for {} keys", records.len(), keys.len());
                Ok(records)
            }
            Ok(Err(e)) => Err(SearchError::DetectionStoreUnavailable(e.to_string())),
            Err(_) => Err(SearchError::DetectionStoreUnavailable(
                "lookup exceeded query deadline".to_string(),
            )),
        }
    }
}

/// Run one source against the shared deadline
async fn bounded<F>(
    kind: SourceKind,
    retrieval: F,
    started: Instant,
    deadline: Instant,
) -> Result<SourceHits, SourceError>
where
    F: Future<Output = Result<SourceHits, SourceError>>,
{
    match tokio::time::timeout_at(deadline, retrieval).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::TimedOut {
            kind,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, KeywordRequest, ScoredKey};
    use crate::query::RawObjectConstraint;
    use crate::retrieval::EmptyDescriptionPolicy;
    use async_trait::async_trait;

    struct StaticKeyword(Vec<KeyframeKey>);

    #[async_trait]
    impl KeywordBackend for StaticKeyword {
        async fn search(&self, _r: &KeywordRequest, limit: usize) -> Result<Vec<ScoredKey>, BackendError> {
            Ok(self
                .0
                .iter()
                .take(limit)
                .map(|k| ScoredKey::new(k.clone(), Some(1.0)))
                .collect())
        }
    }

    struct UnitEncoder;

    #[async_trait]
    impl TextEncoder for UnitEncoder {
        async fn encode(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct FailingVector;

    #[async_trait]
    impl VectorBackend for FailingVector {
        async fn nearest(&self, _e: &[f32], _l: usize) -> Result<Vec<ScoredKey>, BackendError> {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct NoDetections;

    #[async_trait]
    impl DetectionSource for NoDetections {
        async fn fetch_batch(
            &self,
            _keys: &[KeyframeKey],
        ) -> Result<HashMap<KeyframeKey, Vec<DetectedInstance>>, BackendError> {
            Ok(HashMap::new())
        }
    }

    fn engine(config: &RetrievalConfig) -> Result<RetrievalEngine, SearchError> {
        RetrievalEngine::new(
            Arc::new(StaticKeyword(vec![KeyframeKey::new("v", 1), KeyframeKey::new("v", 2)])),
            Arc::new(UnitEncoder),
            Arc::new(FailingVector),
            Arc::new(NoDetections),
            config,
        )
    }

    #[test]
    fn test_rejects_invalid_rrf_k() {
        let config = RetrievalConfig {
            rrf_k: 0.0,
            ..Default::default()
        };
        assert!(matches!(engine(&config), Err(SearchError::Fusion(_))));
    }

    #[tokio::test]
    async fn test_partial_when_one_source_fails() {
        let engine = engine(&RetrievalConfig::default()).unwrap();
        let outcome = engine.search(&RawQuery::new("harbour"), None).await.unwrap();

        assert!(outcome.is_partial());
        assert_eq!(outcome.items().len(), 2);
        assert!(outcome.items().iter().all(|i| i.clip_score.is_none()));
    }

    #[tokio::test]
    async fn test_invalid_query_never_runs() {
        let engine = engine(&RetrievalConfig::default()).unwrap();
        let raw = RawQuery::new("x").with_object(RawObjectConstraint::new("", 2.0));

        match engine.search(&raw, None).await {
            Err(SearchError::InvalidQuery { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("expected InvalidQuery, got {:?}", other.map(|o| o.status)),
        }
    }

    #[tokio::test]
    async fn test_no_text_signal() {
        let config = RetrievalConfig {
            empty_description: EmptyDescriptionPolicy::Empty,
            ..Default::default()
        };
        let engine = engine(&config).unwrap();
        let raw = RawQuery::new("").with_object(RawObjectConstraint::new("dog", 0.5));

        let outcome = engine.search(&raw, None).await.unwrap();
        assert_eq!(outcome.status, SearchStatus::NoTextSignal);
        assert!(outcome.items().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let engine = engine(&RetrievalConfig::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = engine
            .search_with_cancel(&RawQuery::new("harbour"), None, &token)
            .await;
        assert!(matches!(result, Err(SearchError::Cancelled)));
    }
}
