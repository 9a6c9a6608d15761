//! Conversational retrieval.
//!
//! Per question: condense the recent conversation into a standalone
//! question, retrieve the nearest chunks, assemble the prompt, make one
//! chat-completion call, and report the answer together with the chunks
//! that were actually in the prompt.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::ChatConfig;
use crate::core::errors::Result;
use crate::llm::{ChatRequest, LlmProvider};
use crate::rag::{ChunkMatch, EmbeddingService};

use super::history::{self, ConversationTurn};
use super::prompt::PromptBuilder;

/// Outcome of one question: the answer plus the ordered chunks that were
/// included in the prompt. Kept for citation display, not filtered by
/// whether the model's text references them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub answer: String,
    /// What was actually searched, after condensation.
    pub standalone_question: String,
    pub source_chunks: Vec<ChunkMatch>,
}

pub struct ChatService {
    provider: Arc<dyn LlmProvider>,
    store: Arc<EmbeddingService>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<EmbeddingService>,
        config: ChatConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Answer `query` against the store, using the trailing window of
    /// `history` to resolve follow-up phrasing.
    ///
    /// History is explicit per call, so concurrent sessions never share
    /// state. Dropping the returned future cancels any in-flight model
    /// call.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<RetrievalResult> {
        let standalone_question = self.condense(query, history).await?;
        tracing::debug!("retrieving for: {standalone_question}");

        let source_chunks = self
            .store
            .query(&standalone_question, self.config.top_k)
            .await?;

        let context = PromptBuilder::build_context(&source_chunks);
        let messages = PromptBuilder::answer_messages(&standalone_question, &context);
        let answer = self.provider.chat(ChatRequest::new(messages)).await?;

        Ok(RetrievalResult {
            answer,
            standalone_question,
            source_chunks,
        })
    }

    /// Condense the windowed history plus `query` into one standalone
    /// question. An empty window skips the model call entirely, so a fresh
    /// session costs exactly one completion per answer.
    async fn condense(&self, query: &str, history: &[ConversationTurn]) -> Result<String> {
        let windowed = history::window(history, self.config.history_window);
        if windowed.is_empty() {
            return Ok(query.trim().to_string());
        }

        let messages = PromptBuilder::condense_messages(windowed, query);
        let rewritten = self
            .provider
            .chat(ChatRequest::new(messages).deterministic())
            .await?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            // A blank rewrite would retrieve nothing useful; keep the
            // original phrasing instead.
            Ok(query.trim().to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}
