/// Tantivy keyword index over keyframe metadata
use super::{BackendError, KeywordBackend, KeywordRequest, ScoredKey};
use crate::detection::KeyframeKey;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Indexable metadata of one keyframe
#[derive(Debug, Clone)]
pub struct KeyframeDocument {
    pub key: KeyframeKey,
    /// Searchable text (captions, OCR, transcript snippets)
    pub text: String,
    /// Detected object labels, any confidence
    pub labels: Vec<String>,
    /// Audio event tags
    pub audio_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Fields {
    key: Field,
    video_id: Field,
    keyframe_index: Field,
    text: Field,
    labels: Field,
    audio: Field,
}

impl Fields {
    fn from_schema(schema: &Schema) -> Result<Self, KeywordIndexError> {
        let get = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!("Missing '{}' field in schema", name))
            })
        };

        Ok(Self {
            key: get("key")?,
            video_id: get("video_id")?,
            keyframe_index: get("keyframe_index")?,
            text: get("text")?,
            labels: get("labels")?,
            audio: get("audio")?,
        })
    }
}

/// Tantivy keyword index wrapper
///
/// BM25 ranking over keyframe text, with label and audio-tag term filters.
/// Cloning is cheap; clones share the same index and reader.
#[derive(Clone)]
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    fields: Fields,
    index_path: PathBuf,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it if absent
    pub fn new(index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        if index_path.exists() && index_path.join("meta.json").exists() {
            Self::load(index_path)
        } else {
            Self::create(index_path)
        }
    }

    fn schema() -> Schema {
        let mut schema_builder = Schema::builder();

        schema_builder.add_text_field("key", STRING);
        schema_builder.add_text_field("video_id", STRING | STORED);
        schema_builder.add_u64_field("keyframe_index", INDEXED | STORED);
        schema_builder.add_text_field("text", TEXT);
        schema_builder.add_text_field("labels", STRING);
        schema_builder.add_text_field("audio", STRING);

        schema_builder.build()
    }

    fn create(index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        std::fs::create_dir_all(&index_path)?;

        let index = Index::create_in_dir(&index_path, Self::schema())
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Self::from_index(index, index_path)
    }

    fn load(index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        let index = Index::open_in_dir(&index_path)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Self::from_index(index, index_path)
    }

    fn from_index(index: Index, index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        let fields = Fields::from_schema(&index.schema())?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            fields,
            index_path,
        })
    }

    /// Index (or replace) keyframe documents and commit
    pub fn index_documents(&self, documents: &[KeyframeDocument]) -> Result<(), KeywordIndexError> {
        let mut writer: IndexWriter = self
            .index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        for document in documents {
            let key_text = document.key.to_string();
            writer.delete_term(Term::from_field_text(self.fields.key, &key_text));

            let mut doc = TantivyDocument::default();
            doc.add_text(self.fields.key, &key_text);
            doc.add_text(self.fields.video_id, &document.key.video_id);
            doc.add_u64(self.fields.keyframe_index, document.key.keyframe_index);
            doc.add_text(self.fields.text, &document.text);
            for label in &document.labels {
                doc.add_text(self.fields.labels, label);
            }
            for tag in &document.audio_tags {
                doc.add_text(self.fields.audio, tag.to_lowercase());
            }

            writer
                .add_document(doc)
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    fn filter_clauses(&self, request: &KeywordRequest) -> Vec<(Occur, Box<dyn Query>)> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for label in &request.required_labels {
            let term = Term::from_field_text(self.fields.labels, label);
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        if let Some(tag) = &request.audio_tag {
            let term = Term::from_field_text(self.fields.audio, &tag.to_lowercase());
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        clauses
    }

    fn build_query(&self, request: &KeywordRequest) -> Box<dyn Query> {
        let filters = self.filter_clauses(request);

        match &request.text {
            Some(text) => {
                let query_parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
                let (text_query, errors) = query_parser.parse_query_lenient(text);
                if !errors.is_empty() {
                    tracing::debug!("Lenient query parse dropped {} fragment(s)", errors.len());
                }

                if filters.is_empty() {
                    return text_query;
                }

                // Filters must not change BM25 scores
                let filter: Box<dyn Query> =
                    Box::new(ConstScoreQuery::new(Box::new(BooleanQuery::new(filters)), 0.0));
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, filter),
                ]))
            }
            None => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> =
                    vec![(Occur::Must, Box::new(AllQuery))];
                clauses.extend(filters);
                Box::new(ConstScoreQuery::new(Box::new(BooleanQuery::new(clauses)), 1.0))
            }
        }
    }

    /// Run a keyword request
    ///
    /// Text requests are ranked by BM25. Listing requests (no text) return
    /// matching keyframes in index order without scores.
    pub fn search(
        &self,
        request: &KeywordRequest,
        limit: usize,
    ) -> Result<Vec<ScoredKey>, KeywordIndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = self.build_query(request);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let video_id = retrieved_doc
                .get_first(self.fields.video_id)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid video_id field".to_string())
                })?;

            let keyframe_index = retrieved_doc
                .get_first(self.fields.keyframe_index)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError(
                        "Missing or invalid keyframe_index field".to_string(),
                    )
                })?;

            let score = if request.is_listing() {
                None
            } else {
                Some(score)
            };
            results.push(ScoredKey::new(
                KeyframeKey::new(video_id, keyframe_index),
                score,
            ));
        }

        Ok(results)
    }

    /// Directory holding the index
    pub fn path(&self) -> &Path {
        &self.index_path
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        let searcher = self.reader.searcher();
        searcher.num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeywordBackend for KeywordIndex {
    async fn search(
        &self,
        request: &KeywordRequest,
        limit: usize,
    ) -> Result<Vec<ScoredKey>, BackendError> {
        let index = self.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || KeywordIndex::search(&index, &request, limit))
            .await?
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    fn supports_filters(&self) -> bool {
        true
    }

    fn supports_listing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn document(video: &str, index: u64, text: &str, labels: &[&str], audio: &[&str]) -> KeyframeDocument {
        KeyframeDocument {
            key: KeyframeKey::new(video, index),
            text: text.to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            audio_tags: audio.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn populated(temp: &TempDir) -> KeywordIndex {
        let index = KeywordIndex::new(temp.path().join("keywords")).unwrap();
        index
            .index_documents(&[
                document("L01_V001", 10, "a dog running on the beach", &["dog", "person"], &["Barking"]),
                document("L01_V001", 20, "a cat sleeping on a sofa", &["cat"], &[]),
                document("L01_V002", 5, "dog and car on a street", &["dog", "car"], &["engine"]),
                document("L01_V003", 7, "news anchor in studio", &["person"], &["speech"]),
            ])
            .unwrap();
        index
    }

    fn text_request(text: &str) -> KeywordRequest {
        KeywordRequest {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::new(temp.path().join("keywords")).unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_text_search_is_scored() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        let results = index.search(&text_request("dog"), 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score.is_some()));

        let keys: Vec<KeyframeKey> = results.into_iter().map(|r| r.key).collect();
        assert!(keys.contains(&KeyframeKey::new("L01_V001", 10)));
        assert!(keys.contains(&KeyframeKey::new("L01_V002", 5)));
    }

    #[test]
    fn test_label_pushdown() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        let mut request = text_request("dog");
        request.required_labels = vec!["car".to_string()];

        let results = index.search(&request, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, KeyframeKey::new("L01_V002", 5));
    }

    #[test]
    fn test_audio_pushdown_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        let mut request = text_request("dog");
        request.audio_tag = Some("BARKING".to_string());

        let results = index.search(&request, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, KeyframeKey::new("L01_V001", 10));
    }

    #[test]
    fn test_listing_is_unscored() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        let request = KeywordRequest {
            text: None,
            required_labels: vec!["person".to_string()],
            audio_tag: None,
        };

        let results = index.search(&request, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score.is_none()));
    }

    #[test]
    fn test_malformed_text_is_lenient() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        let results = index.search(&text_request("dog \"running"), 10);
        assert!(results.is_ok());
    }

    #[test]
    fn test_reindex_replaces_document() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);

        index
            .index_documents(&[document("L01_V001", 20, "a cat chasing a dog", &["cat", "dog"], &[])])
            .unwrap();

        assert_eq!(index.len(), 4);
        let results = index.search(&text_request("sofa"), 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keywords");

        {
            let index = KeywordIndex::new(path.clone()).unwrap();
            index
                .index_documents(&[document("v", 1, "test document", &[], &[])])
                .unwrap();
        }

        let index = KeywordIndex::new(path).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&text_request("test"), 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_trait_runs_blocking_search() {
        let temp = TempDir::new().unwrap();
        let index = populated(&temp);
        let backend: &dyn KeywordBackend = &index;

        let results = backend.search(&text_request("studio"), 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(backend.supports_filters());
        assert!(backend.supports_listing());
    }
}
