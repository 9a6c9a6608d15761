//! Deterministic in-process provider for tests.
//!
//! Embeddings are bag-of-words hash buckets, so identical texts embed
//! identically (self-similarity is maximal) and unrelated texts diverge.
//! Chat replies are scripted per test; structural assertions only, never
//! literal model output.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::{RagError, Result};

use super::provider::LlmProvider;
use super::types::ChatRequest;

pub const STUB_DIMENSIONS: usize = 16;

pub struct StubProvider {
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    requests: Mutex<Vec<ChatRequest>>,
    chat_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    fail_embeds: AtomicBool,
    fail_chat: AtomicBool,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: "stubbed answer".to_string(),
            requests: Mutex::new(Vec::new()),
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            fail_embeds: AtomicBool::new(false),
            fail_chat: AtomicBool::new(false),
        }
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stub = Self::new();
        stub.replies
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(Into::into));
        stub
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(reply.into());
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn set_embed_failure(&self, fail: bool) {
        self.fail_embeds.store(fail, Ordering::SeqCst);
    }

    pub fn set_chat_failure(&self, fail: bool) {
        self.fail_chat.store(fail, Ordering::SeqCst);
    }

    /// Chat requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Deterministic bag-of-words embedding.
    pub fn embedding_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; STUB_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % STUB_DIMENSIONS;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn next_reply(&self) -> String {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(RagError::service_transient("stub", "chat disabled"));
        }

        Ok(self.next_reply())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let reply = self.chat(request).await?;
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx.send(Ok(reply)).await;
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_embeds.load(Ordering::SeqCst) {
            return Err(RagError::service_transient("stub", "embeddings disabled"));
        }

        Ok(inputs.iter().map(|t| Self::embedding_for(t)).collect())
    }
}
