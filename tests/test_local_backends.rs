//! Integration tests over the on-disk backends
//!
//! Tantivy, HNSW and SQLite are real; the text encoder is stubbed so no model
//! download is needed.

use async_trait::async_trait;
use framefind::backends::{BackendError, KeyframeDocument, LocalBackends, TextEncoder};
use framefind::config::Config;
use framefind::detection::{DetectedInstance, KeyframeKey, KeyframeRecord};
use framefind::error::FramefindError;
use framefind::query::{RawObjectConstraint, RawQuery};
use framefind::retrieval::{RetrievalEngine, SearchStatus};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 4;
const MODEL: &str = "clip-ViT-B-32";

/// Maps every text to the first axis, standing in for "dog running"
struct AxisEncoder;

#[async_trait]
impl TextEncoder for AxisEncoder {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct Keyframe {
    key: KeyframeKey,
    text: &'static str,
    detections: Vec<(&'static str, f32)>,
    audio: Vec<&'static str>,
    vector: [f32; DIM],
}

fn corpus() -> Vec<Keyframe> {
    vec![
        Keyframe {
            key: KeyframeKey::new("L01_V001", 10),
            text: "a dog running on the beach",
            detections: vec![("dog", 0.92)],
            audio: vec!["Barking"],
            vector: [1.0, 0.0, 0.0, 0.0],
        },
        Keyframe {
            key: KeyframeKey::new("L01_V001", 20),
            text: "a dog sleeping on a sofa",
            detections: vec![("dog", 0.41)],
            audio: vec![],
            vector: [0.0, 1.0, 0.0, 0.0],
        },
        Keyframe {
            key: KeyframeKey::new("L02_V003", 5),
            text: "children running in the park",
            detections: vec![("person", 0.9), ("person", 0.85), ("dog", 0.81)],
            audio: vec!["laughter"],
            vector: [0.9, 0.1, 0.0, 0.0],
        },
        Keyframe {
            key: KeyframeKey::new("L03_V007", 1),
            text: "city street at night",
            detections: vec![("car", 0.9), ("car", 0.7)],
            audio: vec!["siren"],
            vector: [0.0, 0.0, 1.0, 0.0],
        },
    ]
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.indexing.vector_dim = DIM;
    config.indexing.max_elements = 100;
    config.embedding.model = MODEL.to_string();
    config
}

fn populate(backends: &LocalBackends) {
    let documents: Vec<KeyframeDocument> = corpus()
        .into_iter()
        .map(|kf| KeyframeDocument {
            key: kf.key,
            text: kf.text.to_string(),
            labels: kf.detections.iter().map(|(l, _)| l.to_string()).collect(),
            audio_tags: kf.audio.iter().map(|a| a.to_string()).collect(),
        })
        .collect();
    backends.keyword_index.index_documents(&documents).unwrap();

    for kf in corpus() {
        let record = KeyframeRecord::new(
            kf.key.clone(),
            kf.detections
                .iter()
                .map(|(label, c)| DetectedInstance::new(*label, *c))
                .collect(),
        );
        backends.detection_db.upsert_record(&record).unwrap();
        backends
            .detection_db
            .upsert_vector(&kf.key, &kf.vector, MODEL)
            .unwrap();
        backends.vector_index.insert(kf.key, &kf.vector).unwrap();
    }
}

fn engine(backends: &LocalBackends, config: &Config) -> RetrievalEngine {
    RetrievalEngine::new(
        Arc::new(backends.keyword_index.clone()),
        Arc::new(AxisEncoder),
        Arc::new(backends.vector_index.clone()),
        Arc::new(backends.detection_db.clone()),
        &config.retrieval,
    )
    .unwrap()
}

fn keys(outcome: &framefind::retrieval::SearchOutcome) -> Vec<KeyframeKey> {
    outcome.items().iter().map(|i| i.key()).collect()
}

#[tokio::test]
async fn test_local_pipeline_end_to_end() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
    populate(&backends);
    println!("✓ Stores populated at {:?}", temp.path());

    let engine = engine(&backends, &config);
    let raw = RawQuery::new("dog running")
        .with_object(RawObjectConstraint::new("dog", 0.7).with_min(1));

    let outcome = engine.search(&raw, None).await.unwrap();

    assert_eq!(outcome.status, SearchStatus::Complete);
    assert_eq!(
        keys(&outcome),
        vec![KeyframeKey::new("L01_V001", 10), KeyframeKey::new("L02_V003", 5)]
    );

    let best = &outcome.items()[0];
    assert!(best.clip_score.unwrap().abs() < 1e-5);
    assert!(best.rrf_score > outcome.items()[1].rrf_score);
    println!("✓ Fused and filtered: {:?}", keys(&outcome));
}

#[tokio::test]
async fn test_local_listing_with_audio_pushdown() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
    populate(&backends);
    let engine = engine(&backends, &config);

    // No description: candidates come from the keyword listing
    let raw = RawQuery::new("")
        .with_object(RawObjectConstraint::new("car", 0.5).with_min(2))
        .with_audio("SIREN");

    let outcome = engine.search(&raw, None).await.unwrap();

    assert_eq!(outcome.status, SearchStatus::Complete);
    assert_eq!(keys(&outcome), vec![KeyframeKey::new("L03_V007", 1)]);
    assert_eq!(outcome.items()[0].clip_score, None);
}

#[tokio::test]
async fn test_cardinality_against_sqlite_records() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
    populate(&backends);
    let engine = engine(&backends, &config);

    // At least two confident people, no more than two
    let raw = RawQuery::new("running")
        .with_object(RawObjectConstraint::new("person", 0.8).with_min(2).with_max(2));

    let outcome = engine.search(&raw, None).await.unwrap();
    assert_eq!(keys(&outcome), vec![KeyframeKey::new("L02_V003", 5)]);
}

#[tokio::test]
async fn test_reopen_rebuilds_vector_index() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    {
        let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
        populate(&backends);
    }

    let reopened = LocalBackends::open_stores(&config, temp.path()).unwrap();
    assert_eq!(reopened.vector_index.len(), 4);
    assert_eq!(reopened.keyword_index.len(), 4);

    let stats = reopened.detection_db.stats().unwrap();
    assert_eq!(stats.keyframe_count, 4);
    assert_eq!(stats.detection_count, 7);
    assert_eq!(stats.vector_count, 4);

    let engine = engine(&reopened, &config);
    let outcome = engine.search(&RawQuery::new("beach"), Some(1)).await.unwrap();
    assert_eq!(keys(&outcome), vec![KeyframeKey::new("L01_V001", 10)]);
}

#[tokio::test]
async fn test_embedding_only_keyframe_fails_constraints() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
    populate(&backends);

    // Embedded but never run through the detector
    let undetected = KeyframeKey::new("L04_V001", 3);
    let vector = [1.0, 0.0, 0.0, 0.0];
    backends
        .detection_db
        .upsert_vector(&undetected, &vector, MODEL)
        .unwrap();
    backends.vector_index.insert(undetected.clone(), &vector).unwrap();

    let engine = engine(&backends, &config);
    let no_dogs = RawQuery::new("dog running")
        .with_object(RawObjectConstraint::new("dog", 0.5).with_min(0).with_max(0));

    let outcome = engine.search(&no_dogs, None).await.unwrap();
    let mut found = keys(&outcome);
    found.sort();

    assert!(!found.contains(&undetected));
    assert_eq!(
        found,
        vec![KeyframeKey::new("L01_V001", 20), KeyframeKey::new("L03_V007", 1)]
    );

    // Without constraints the same keyframe is a legitimate hit
    let outcome = engine.search(&RawQuery::new("dog running"), None).await.unwrap();
    assert!(keys(&outcome).contains(&undetected));
}

#[test]
fn test_into_engine_requires_encoder() {
    let temp = TempDir::new().unwrap();
    let config = test_config();

    let backends = LocalBackends::open_stores(&config, temp.path()).unwrap();
    assert!(backends.encoder.is_none());
    assert!(matches!(
        backends.into_engine(&config),
        Err(FramefindError::Config(_))
    ));
}

#[tokio::test]
#[ignore] // Requires model download - run with: cargo test -- --ignored
async fn test_local_backends_with_clip_encoder() {
    let temp = TempDir::new().unwrap();
    let config = Config::default();

    let backends = LocalBackends::open(&config, temp.path()).unwrap();
    let engine = backends.into_engine(&config).unwrap();

    let outcome = engine
        .search(&RawQuery::new("a dog running on the beach"), None)
        .await
        .unwrap();
    assert!(outcome.items().is_empty());
}
