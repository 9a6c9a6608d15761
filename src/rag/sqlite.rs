//! SQLite-backed vector store.
//!
//! Metadata lives in relational columns, embeddings as little-endian f32
//! BLOBs, and search is a brute-force cosine scan. The corpus for one
//! deployment is a few hundred chunks, well inside what a linear scan
//! handles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::errors::{RagError, Result};

use super::store::{ChunkMatch, StoredChunk, VectorStore};

#[derive(Debug)]
pub struct SqliteChunkStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
    dimensions: usize,
    build_id: String,
}

impl SqliteChunkStore {
    /// Create a fresh store at `path`, replacing any previous contents and
    /// stamping a new build id. All prior chunk ids become invalid.
    pub async fn create(path: &Path, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::configuration("embedding dimensions must be positive"));
        }

        let pool = connect(path, true).await?;
        init_schema(&pool).await?;

        sqlx::query("DELETE FROM chunks").execute(&pool).await?;

        let build_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT OR REPLACE INTO store_meta (key, value) VALUES
             ('dimensions', ?1), ('build_id', ?2)",
        )
        .bind(dimensions.to_string())
        .bind(&build_id)
        .execute(&pool)
        .await?;

        tracing::info!("created vector store at {} (build {})", path.display(), build_id);

        Ok(Self {
            pool,
            db_path: path.to_path_buf(),
            dimensions,
            build_id,
        })
    }

    /// Open a previously built store.
    ///
    /// A missing file is a `NotFound` telling the caller to rebuild, kept
    /// distinct from transient I/O failures, which map to `Storage`.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::not_found(format!(
                "no vector store at {}; run the build pipeline to create one",
                path.display()
            )));
        }

        let pool = connect(path, false).await?;
        init_schema(&pool).await?;

        let dimensions: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dimensions'")
                .fetch_optional(&pool)
                .await?;
        let build_id: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'build_id'")
                .fetch_optional(&pool)
                .await?;

        let dimensions = dimensions
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| {
                RagError::storage(format!("store at {} has no dimension metadata", path.display()))
            })?;
        let build_id = build_id.ok_or_else(|| {
            RagError::storage(format!("store at {} has no build id", path.display()))
        })?;

        Ok(Self {
            pool,
            db_path: path.to_path_buf(),
            dimensions,
            build_id,
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let sources_str: String = row.get("source_ids");
        let source_ids = serde_json::from_str::<Vec<String>>(&sources_str).unwrap_or_default();

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            title: row.get("title"),
            summary: row.get("summary"),
            content: row.get("content"),
            source_ids,
        }
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(RagError::from)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            source_ids TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl VectorStore for SqliteChunkStore {
    async fn insert_batch(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        for (chunk, embedding) in &items {
            if embedding.len() != self.dimensions {
                return Err(RagError::configuration(format!(
                    "chunk {} embedding has {} dimensions, store expects {}",
                    chunk.chunk_id,
                    embedding.len(),
                    self.dimensions
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let sources = serde_json::to_string(&chunk.source_ids).unwrap_or_else(|_| "[]".into());

            sqlx::query(
                "INSERT OR REPLACE INTO chunks (chunk_id, title, summary, content, source_ids, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.title)
            .bind(&chunk.summary)
            .bind(&chunk.content)
            .bind(&sources)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ChunkMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, title, summary, content, source_ids, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ChunkMatch> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                ChunkMatch {
                    chunk: Self::row_to_chunk(row),
                    score: Self::cosine_similarity(query_embedding, &stored),
                }
            })
            .collect();

        // Descending score; equal scores resolve by ascending chunk id so
        // repeated queries return identical orderings.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn build_id(&self) -> &str {
        &self.build_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        (dir, path)
    }

    fn chunk(id: &str, content: &str) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            title: format!("title {id}"),
            summary: format!("summary {id}"),
            content: content.to_string(),
            source_ids: vec!["doc.pdf".to_string()],
        }
    }

    #[tokio::test]
    async fn round_trip_ranks_identical_vector_first() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 3).await.unwrap();

        store
            .insert_batch(vec![
                (chunk("a", "alpha"), vec![1.0, 0.0, 0.0]),
                (chunk("b", "beta"), vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "a");
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn k_beyond_store_size_returns_every_record_once() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 2).await.unwrap();

        store
            .insert_batch(vec![
                (chunk("a", "one"), vec![1.0, 0.0]),
                (chunk("b", "two"), vec![0.0, 1.0]),
                (chunk("c", "three"), vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 100).await.unwrap();
        let mut ids: Vec<&str> = results.iter().map(|m| m.chunk.chunk_id.as_str()).collect();
        assert_eq!(results.len(), 3);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn empty_store_returns_empty_not_error() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 2).await.unwrap();

        let results = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_ascending_chunk_id() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 2).await.unwrap();

        // Same embedding, inserted in descending id order.
        store
            .insert_batch(vec![
                (chunk("zz", "same"), vec![1.0, 0.0]),
                (chunk("aa", "same"), vec![1.0, 0.0]),
                (chunk("mm", "same"), vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        for _ in 0..3 {
            let results = store.search(&[1.0, 0.0], 10).await.unwrap();
            let ids: Vec<&str> = results.iter().map(|m| m.chunk.chunk_id.as_str()).collect();
            assert_eq!(ids, vec!["aa", "mm", "zz"]);
        }
    }

    #[tokio::test]
    async fn open_missing_store_is_not_found() {
        let (_dir, path) = temp_db();
        let err = SqliteChunkStore::open(&path).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[tokio::test]
    async fn reopen_preserves_metadata_and_results() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 2).await.unwrap();
        let build_id = store.build_id().to_string();

        store
            .insert_batch(vec![(chunk("a", "alpha"), vec![1.0, 0.0])])
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteChunkStore::open(&path).await.unwrap();
        assert_eq!(reopened.dimensions(), 2);
        assert_eq!(reopened.build_id(), build_id);

        let first = reopened.search(&[1.0, 0.0], 5).await.unwrap();
        let again = SqliteChunkStore::open(&path).await.unwrap();
        let second = again.search(&[1.0, 0.0], 5).await.unwrap();

        let ids = |ms: &[ChunkMatch]| {
            ms.iter()
                .map(|m| m.chunk.chunk_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn rebuild_replaces_records_and_build_id() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 2).await.unwrap();
        let old_build = store.build_id().to_string();
        store
            .insert_batch(vec![(chunk("a", "alpha"), vec![1.0, 0.0])])
            .await
            .unwrap();
        drop(store);

        let rebuilt = SqliteChunkStore::create(&path, 2).await.unwrap();
        assert_eq!(rebuilt.count().await.unwrap(), 0);
        assert_ne!(rebuilt.build_id(), old_build);
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() {
        let (_dir, path) = temp_db();
        let store = SqliteChunkStore::create(&path, 3).await.unwrap();

        let err = store
            .insert_batch(vec![(chunk("a", "alpha"), vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
