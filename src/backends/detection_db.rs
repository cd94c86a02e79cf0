//! SQLite detection metadata store with migrations
//!
//! Holds the detection record of every known keyframe and the keyframe
//! embeddings the in-memory vector index is rebuilt from.

use super::{BackendError, DetectionSource};
use crate::detection::{DetectedInstance, KeyframeKey, KeyframeRecord};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Keys per lookup statement; two bound parameters each
const LOOKUP_CHUNK: usize = 400;

#[derive(Error, Debug)]
pub enum DetectionDbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt vector for {key}: {message}")]
    CorruptVector { key: KeyframeKey, message: String },
}

/// Detection store
#[derive(Clone)]
pub struct DetectionDb {
    pool: DbPool,
}

impl DetectionDb {
    /// Open (or create) the store at `db_path`
    pub fn new(db_path: &Path) -> Result<Self, DetectionDbError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, DetectionDbError> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<(), DetectionDbError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying detection store migration {}", version);

                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert or replace a keyframe's detection record
    pub fn upsert_record(&self, record: &KeyframeRecord) -> Result<(), DetectionDbError> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let video_id = &record.key.video_id;
        let keyframe_index = record.key.keyframe_index as i64;

        tx.execute(
            "INSERT INTO keyframes (video_id, keyframe_index, detected_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT (video_id, keyframe_index) DO UPDATE SET detected_at = excluded.detected_at",
            params![video_id, keyframe_index],
        )?;
        tx.execute(
            "DELETE FROM detections WHERE video_id = ?1 AND keyframe_index = ?2",
            params![video_id, keyframe_index],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO detections (video_id, keyframe_index, label, confidence)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for detection in &record.detections {
                stmt.execute(params![
                    video_id,
                    keyframe_index,
                    detection.label,
                    f64::from(detection.confidence)
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Store a keyframe embedding produced by `model`.
    ///
    /// Does not create a detection record: a keyframe known only by its
    /// embedding stays absent from `fetch_records`.
    pub fn upsert_vector(
        &self,
        key: &KeyframeKey,
        vector: &[f32],
        model: &str,
    ) -> Result<(), DetectionDbError> {
        let conn = self.get_conn()?;
        let blob: Vec<u8> = vector.iter().flat_map(|x| x.to_le_bytes()).collect();

        conn.execute(
            "INSERT OR IGNORE INTO keyframes (video_id, keyframe_index) VALUES (?1, ?2)",
            params![key.video_id, key.keyframe_index as i64],
        )?;
        conn.execute(
            "INSERT INTO keyframe_vectors (video_id, keyframe_index, model, vector)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (video_id, keyframe_index, model) DO UPDATE SET vector = excluded.vector",
            params![key.video_id, key.keyframe_index as i64, model, blob],
        )?;

        Ok(())
    }

    /// Load every stored embedding for `model`, in key order
    pub fn load_vectors(&self, model: &str) -> Result<Vec<(KeyframeKey, Vec<f32>)>, DetectionDbError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT video_id, keyframe_index, vector FROM keyframe_vectors
             WHERE model = ?1 ORDER BY video_id, keyframe_index",
        )?;

        let rows = stmt.query_map(params![model], |row| {
            let video_id: String = row.get(0)?;
            let keyframe_index: i64 = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            Ok((KeyframeKey::new(video_id, keyframe_index as u64), blob))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (key, blob) = row?;
            if blob.len() % 4 != 0 {
                return Err(DetectionDbError::CorruptVector {
                    key,
                    message: format!("blob length {} is not a multiple of 4", blob.len()),
                });
            }
            let vector = blob
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            vectors.push((key, vector));
        }

        Ok(vectors)
    }

    /// Fetch detection records for a batch of keys.
    ///
    /// Keys without a detection record are absent from the result, even when
    /// an embedding is stored for them. A record with no detections maps to
    /// an empty list.
    pub fn fetch_records(
        &self,
        keys: &[KeyframeKey],
    ) -> Result<HashMap<KeyframeKey, Vec<DetectedInstance>>, DetectionDbError> {
        let mut records: HashMap<KeyframeKey, Vec<DetectedInstance>> = HashMap::new();
        if keys.is_empty() {
            return Ok(records);
        }

        let conn = self.get_conn()?;

        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("(?{}, ?{})", 2 * i + 1, 2 * i + 2))
                .collect::<Vec<_>>()
                .join(", ");

            let sql = format!(
                "SELECT k.video_id, k.keyframe_index, d.label, d.confidence
                 FROM keyframes k
                 LEFT JOIN detections d
                   ON d.video_id = k.video_id AND d.keyframe_index = k.keyframe_index
                 WHERE k.detected_at IS NOT NULL
                   AND (k.video_id, k.keyframe_index) IN (VALUES {})",
                placeholders
            );

            let values: Vec<Value> = chunk
                .iter()
                .flat_map(|key| {
                    [
                        Value::Text(key.video_id.clone()),
                        Value::Integer(key.keyframe_index as i64),
                    ]
                })
                .collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                let video_id: String = row.get(0)?;
                let keyframe_index: i64 = row.get(1)?;
                let label: Option<String> = row.get(2)?;
                let confidence: Option<f64> = row.get(3)?;
                Ok((video_id, keyframe_index, label, confidence))
            })?;

            for row in rows {
                let (video_id, keyframe_index, label, confidence) = row?;
                let detections = records
                    .entry(KeyframeKey::new(video_id, keyframe_index as u64))
                    .or_default();
                if let (Some(label), Some(confidence)) = (label, confidence) {
                    detections.push(DetectedInstance::new(label, confidence as f32));
                }
            }
        }

        Ok(records)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<DetectionDbStats, DetectionDbError> {
        let conn = self.get_conn()?;

        let keyframe_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM keyframes WHERE detected_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let detection_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        let vector_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM keyframe_vectors", [], |row| row.get(0))?;
        let label_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT label) FROM detections",
            [],
            |row| row.get(0),
        )?;

        Ok(DetectionDbStats {
            keyframe_count: keyframe_count as usize,
            detection_count: detection_count as usize,
            vector_count: vector_count as usize,
            label_count: label_count as usize,
        })
    }
}

#[async_trait]
impl DetectionSource for DetectionDb {
    async fn fetch_batch(
        &self,
        keys: &[KeyframeKey],
    ) -> Result<HashMap<KeyframeKey, Vec<DetectedInstance>>, BackendError> {
        let db = self.clone();
        let keys = keys.to_vec();

        tokio::task::spawn_blocking(move || db.fetch_records(&keys))
            .await?
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }
}

/// Detection store statistics
#[derive(Debug)]
pub struct DetectionDbStats {
    /// Keyframes with a detection record
    pub keyframe_count: usize,
    pub detection_count: usize,
    pub vector_count: usize,
    pub label_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE keyframes (
        video_id TEXT NOT NULL,
        keyframe_index INTEGER NOT NULL,
        PRIMARY KEY (video_id, keyframe_index)
    );

    CREATE TABLE detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL,
        keyframe_index INTEGER NOT NULL,
        label TEXT NOT NULL,
        confidence REAL NOT NULL,
        FOREIGN KEY (video_id, keyframe_index)
            REFERENCES keyframes(video_id, keyframe_index) ON DELETE CASCADE
    );

    CREATE INDEX idx_detections_keyframe ON detections(video_id, keyframe_index);
    CREATE INDEX idx_detections_label ON detections(label, confidence);

    CREATE TABLE keyframe_vectors (
        video_id TEXT NOT NULL,
        keyframe_index INTEGER NOT NULL,
        model TEXT NOT NULL,
        vector BLOB NOT NULL,
        PRIMARY KEY (video_id, keyframe_index, model),
        FOREIGN KEY (video_id, keyframe_index)
            REFERENCES keyframes(video_id, keyframe_index) ON DELETE CASCADE
    );
    "#,
    // Migration 2: separate detection records from embedding-only keyframes
    r#"
    ALTER TABLE keyframes ADD COLUMN detected_at TEXT;

    UPDATE keyframes SET detected_at = datetime('now')
    WHERE EXISTS (
        SELECT 1 FROM detections d
        WHERE d.video_id = keyframes.video_id AND d.keyframe_index = keyframes.keyframe_index
    );
    "#,
];
