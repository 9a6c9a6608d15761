//! Storage types and the vector-store abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunking::Chunk;
use crate::core::errors::Result;

/// A persisted chunk: the retrievable unit plus the metadata needed to
/// reconstruct citations. Read-only once written; a rebuild replaces the
/// whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub title: String,
    pub summary: String,
    /// Concatenated member proposition texts.
    pub content: String,
    /// Source documents that contributed propositions, in first-seen order.
    pub source_ids: Vec<String>,
}

impl StoredChunk {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.to_string(),
            title: chunk.title.clone(),
            summary: chunk.summary.clone(),
            content: chunk.full_text(),
            source_ids: chunk.source_ids(),
        }
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk: StoredChunk,
    /// Cosine similarity, higher is better.
    pub score: f32,
}

/// Vector storage backend: insert embedded chunks, search by similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert chunks with their embeddings in one transaction.
    async fn insert_batch(&self, items: Vec<(StoredChunk, Vec<f32>)>) -> Result<()>;

    /// Return up to `k` nearest chunks by cosine similarity, ties broken by
    /// ascending chunk id. `k` larger than the store degrades to all rows.
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ChunkMatch>>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Embedding dimensionality every record in this store must share.
    fn dimensions(&self) -> usize;

    /// Identifier of the build that produced this store; regenerated on
    /// every rebuild.
    fn build_id(&self) -> &str;
}
