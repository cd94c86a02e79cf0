/// HNSW vector index over keyframe embeddings
use super::{BackendError, ScoredKey, VectorBackend};
use crate::detection::KeyframeKey;
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Upper bound on HNSW layers
const MAX_LAYER: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index lock poisoned")]
    Poisoned,
}

/// HNSW vector index wrapper
///
/// Approximate nearest-neighbour search with Euclidean (L2) distance, the
/// metric the keyframe embeddings were indexed with. Distances are returned
/// as-is: lower is more similar.
///
/// HNSW data ids are positions in `keys`, which maps them back to keyframes.
#[derive(Clone)]
pub struct VectorIndex {
    index: Arc<Hnsw<'static, f32, DistL2>>,
    keys: Arc<RwLock<Vec<KeyframeKey>>>,
    dimension: usize,
    ef_search: usize,
}

impl VectorIndex {
    /// Create an empty vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match the encoder)
    /// * `m` - HNSW M parameter (connections per layer)
    /// * `ef_construction` - HNSW construction parameter
    /// * `max_elements` - Expected number of vectors
    /// * `ef_search` - HNSW search parameter (higher = better recall, slower search)
    pub fn new(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        max_elements: usize,
        ef_search: usize,
    ) -> Self {
        let index = Hnsw::<f32, DistL2>::new(m, max_elements, MAX_LAYER, ef_construction, DistL2);

        Self {
            index: Arc::new(index),
            keys: Arc::new(RwLock::new(Vec::new())),
            dimension,
            ef_search,
        }
    }

    /// Build an index from persisted vectors
    pub fn from_vectors(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        max_elements: usize,
        ef_search: usize,
        vectors: Vec<(KeyframeKey, Vec<f32>)>,
    ) -> Result<Self, VectorIndexError> {
        let index = Self::new(dimension, m, ef_construction, max_elements.max(1), ef_search);
        for (key, vector) in vectors {
            index.insert(key, &vector)?;
        }
        Ok(index)
    }

    /// Insert a keyframe embedding
    pub fn insert(&self, key: KeyframeKey, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorIndexError::InsertError(format!(
                "Non-finite component in vector for {}",
                key
            )));
        }

        let data = vector.to_vec();

        // Hold the key table lock across the insert so ids and keys stay aligned
        let mut keys = self.keys.write().map_err(|_| VectorIndexError::Poisoned)?;
        let id = keys.len();
        keys.push(key);
        self.index.insert((data.as_slice(), id));

        Ok(())
    }

    /// Search for the `k` nearest keyframes, smallest distance first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(KeyframeKey, f32)>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let keys = self.keys.read().map_err(|_| VectorIndexError::Poisoned)?;
        if keys.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let neighbours = self.index.search(query, k, self.ef_search.max(k));

        let mut results = Vec::with_capacity(neighbours.len());
        for neighbour in neighbours {
            let key = keys.get(neighbour.d_id).ok_or_else(|| {
                VectorIndexError::SearchError(format!("Unknown data id {}", neighbour.d_id))
            })?;
            results.push((key.clone(), neighbour.distance));
        }

        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(results)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorBackend for VectorIndex {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredKey>, BackendError> {
        let index = self.clone();
        let embedding = embedding.to_vec();

        let results = tokio::task::spawn_blocking(move || index.search(&embedding, limit))
            .await?
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(results
            .into_iter()
            .map(|(key, distance)| ScoredKey::new(key, Some(distance)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(8, 16, 200, 100, 50);
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(8, 16, 200, 100, 50);
        assert!(index.search(&unit(8, 0), 5).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_search_returns_distances_ascending() {
        let index = VectorIndex::new(4, 16, 200, 100, 50);

        index.insert(KeyframeKey::new("a", 1), &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.insert(KeyframeKey::new("b", 2), &[0.0, 1.0, 0.0, 0.0]).unwrap();
        index.insert(KeyframeKey::new("c", 3), &[0.9, 0.1, 0.0, 0.0]).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, KeyframeKey::new("a", 1));
        assert_eq!(results[1].0, KeyframeKey::new("c", 3));
        assert!(results[0].1 <= results[1].1);
        assert!(results[1].1 <= results[2].1);
        assert!(results[0].1.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(4, 16, 200, 100, 50);
        assert!(index.insert(KeyframeKey::new("a", 1), &[1.0; 3]).is_err());
        assert!(index.search(&[1.0; 5], 1).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let index = VectorIndex::new(2, 16, 200, 100, 50);
        assert!(index.insert(KeyframeKey::new("a", 1), &[f32::NAN, 0.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_vectors() {
        let vectors: Vec<(KeyframeKey, Vec<f32>)> = (0..10)
            .map(|i| (KeyframeKey::new("v", i), unit(10, i as usize)))
            .collect();

        let index = VectorIndex::from_vectors(10, 16, 200, 10, 50, vectors).unwrap();
        assert_eq!(index.len(), 10);

        let results = index.search(&unit(10, 7), 1).unwrap();
        assert_eq!(results[0].0, KeyframeKey::new("v", 7));
    }

    #[tokio::test]
    async fn test_backend_trait_carries_distance() {
        let index = VectorIndex::new(2, 16, 200, 10, 50);
        index.insert(KeyframeKey::new("a", 1), &[0.0, 0.0]).unwrap();
        index.insert(KeyframeKey::new("b", 1), &[3.0, 4.0]).unwrap();

        let backend: &dyn VectorBackend = &index;
        let hits = backend.nearest(&[0.0, 0.0], 2).await.unwrap();

        assert_eq!(hits[0].key, KeyframeKey::new("a", 1));
        assert_eq!(hits[1].key, KeyframeKey::new("b", 1));
        assert!((hits[1].score.unwrap() - 5.0).abs() < 1e-4);
    }
}
