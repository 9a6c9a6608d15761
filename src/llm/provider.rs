use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::Result;

use super::types::ChatRequest;

/// Capability contract for every hosted model service the core depends on.
///
/// Grouping decisions, question condensation, answer generation, and
/// embedding all go through this trait, so the pipeline and the retriever
/// can be exercised with a deterministic in-process implementation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging (e.g. "openai").
    fn name(&self) -> &str;

    /// Check whether the provider is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Chat completion (non-streaming).
    async fn chat(&self, request: ChatRequest) -> Result<String>;

    /// Chat completion streamed as text deltas, for interactive UIs.
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String>>>;

    /// Generate one embedding per input text, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}
