//! Build pipeline: documents in, persisted vector store out.
//!
//! One sequential batch job with no checkpointing: an interrupted or failed
//! build is restarted from scratch, and a failed build never replaces the
//! previous store.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunking::{AgenticChunker, PropositionSplitter, SourceDocument};
use crate::core::config::ChunkingConfig;
use crate::core::errors::{RagError, Result};
use crate::llm::LlmProvider;
use crate::rag::EmbeddingService;

/// Counts for the host to display after a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents: usize,
    pub propositions: usize,
    pub chunks: usize,
    pub stored_records: usize,
    pub build_id: String,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

pub struct BuildPipeline {
    provider: Arc<dyn LlmProvider>,
    chunking: ChunkingConfig,
    dimensions: usize,
}

impl BuildPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        chunking: ChunkingConfig,
        dimensions: usize,
    ) -> Self {
        Self {
            provider,
            chunking,
            dimensions,
        }
    }

    /// Split, group, embed, and persist `documents` as a fresh store at
    /// `store_path`. Any failure aborts the whole batch.
    pub async fn run(
        &self,
        documents: &[SourceDocument],
        store_path: &Path,
    ) -> Result<(EmbeddingService, BuildReport)> {
        if documents.is_empty() {
            return Err(RagError::configuration("no documents to ingest"));
        }

        match self.provider.health_check().await {
            Ok(true) => {}
            _ => tracing::warn!(
                "{} provider did not answer the health check; continuing anyway",
                self.provider.name()
            ),
        }

        let splitter = PropositionSplitter::new(&self.chunking);
        let propositions = splitter.split(documents);
        if propositions.is_empty() {
            return Err(RagError::configuration(
                "documents contained no extractable text",
            ));
        }
        let proposition_count = propositions.len();

        let chunker = AgenticChunker::new(self.provider.clone())
            .with_limit(self.chunking.max_propositions);
        let chunks = chunker.group(propositions).await?;

        let store =
            EmbeddingService::build(self.provider.clone(), store_path, self.dimensions, &chunks)
                .await?;

        let report = BuildReport {
            documents: documents.len(),
            propositions: proposition_count,
            chunks: chunks.len(),
            stored_records: store.count().await?,
            build_id: store.build_id().to_string(),
            built_at: chrono::Utc::now(),
        };

        tracing::info!(
            "build complete: {} documents, {} propositions, {} chunks, {} records",
            report.documents,
            report.propositions,
            report.chunks,
            report.stored_records
        );

        Ok((store, report))
    }
}
