//! Embedding store management: build, load, query.
//!
//! `build` embeds every chunk before touching disk, so a failed build never
//! leaves a partial index behind. `query` caches the embedding computed for
//! each exact query text for the lifetime of the service.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chunking::Chunk;
use crate::core::errors::{RagError, Result};
use crate::llm::LlmProvider;

use super::sqlite::SqliteChunkStore;
use super::store::{ChunkMatch, StoredChunk, VectorStore};

/// Chunks embedded per request to the embedding endpoint.
const EMBED_BATCH: usize = 64;

pub struct EmbeddingService {
    provider: Arc<dyn LlmProvider>,
    store: SqliteChunkStore,
    query_cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("store", &self.store)
            .field("query_cache", &self.query_cache)
            .finish_non_exhaustive()
    }
}

impl EmbeddingService {
    /// Embed `chunks` and persist them as a fresh store at `path`.
    ///
    /// All embeddings are computed before the store is touched, so an
    /// embedding failure leaves any previous store intact. The rows
    /// themselves go in as one transaction; a partial index is never
    /// visible.
    pub async fn build(
        provider: Arc<dyn LlmProvider>,
        path: &Path,
        dimensions: usize,
        chunks: &[Chunk],
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::configuration("no chunks to index"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.full_text()).collect();
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            embeddings.extend(provider.embed(batch).await?);
        }

        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            if embedding.len() != dimensions {
                return Err(RagError::configuration(format!(
                    "embedding for chunk {} has {} dimensions, expected {}",
                    chunk.id,
                    embedding.len(),
                    dimensions
                )));
            }
        }

        let store = SqliteChunkStore::create(path, dimensions).await?;
        let items: Vec<(StoredChunk, Vec<f32>)> = chunks
            .iter()
            .map(StoredChunk::from_chunk)
            .zip(embeddings)
            .collect();
        store.insert_batch(items).await?;

        tracing::info!(
            "indexed {} chunks at {} (build {})",
            chunks.len(),
            path.display(),
            store.build_id()
        );

        Ok(Self {
            provider,
            store,
            query_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Open a previously built store without recomputing anything.
    pub async fn load(provider: Arc<dyn LlmProvider>, path: &Path) -> Result<Self> {
        let store = SqliteChunkStore::open(path).await?;
        tracing::info!(
            "loaded vector store at {} ({} records, build {})",
            path.display(),
            store.count().await?,
            store.build_id()
        );

        Ok(Self {
            provider,
            store,
            query_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Return the `k` stored chunks nearest to `text`.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ChunkMatch>> {
        if k == 0 {
            return Err(RagError::configuration("top-k must be positive"));
        }

        let embedding = self.query_embedding(text).await?;
        self.store.search(&embedding, k).await
    }

    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        {
            let cache = self.query_cache.lock().await;
            if let Some(hit) = cache.get(text) {
                return Ok(hit.clone());
            }
        }

        let mut embeddings = self.provider.embed(&[text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                RagError::service(self.provider.name(), "empty embedding for query text")
            })?;

        self.query_cache
            .lock()
            .await
            .insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }

    pub fn build_id(&self) -> &str {
        self.store.build_id()
    }

    pub fn dimensions(&self) -> usize {
        self.store.dimensions()
    }
}
