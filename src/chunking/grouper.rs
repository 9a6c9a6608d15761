//! Agentic chunk grouping.
//!
//! Propositions are consumed strictly in input order. For each one the
//! reasoning service is shown the open chunks' ids, titles, and summaries
//! and asked to either pick a chunk or answer NEW. Membership only ever
//! grows; chunks are never split or merged. An unparseable decision falls
//! back to a new chunk, so a confused model over-segments instead of
//! mis-grouping.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::errors::{RagError, Result};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

use super::types::{Chunk, Proposition};

const SELECT_INSTRUCTIONS: &str = "You are grouping short statements from a document corpus into topical chunks. \
You will see the existing chunks (id, title, summary) and one new statement. \
If the statement belongs to an existing chunk, reply with that chunk's id and nothing else. \
If it starts a new topic, reply with the single word NEW.";

pub struct AgenticChunker {
    provider: Arc<dyn LlmProvider>,
    /// Cap on processed propositions; `None` processes the full input.
    max_propositions: Option<usize>,
}

impl AgenticChunker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_propositions: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.max_propositions = limit;
        self
    }

    /// Group propositions into chunks, preserving input order.
    ///
    /// Service failures (after the provider's own retries) abort the whole
    /// batch; only decision *parsing* problems are absorbed locally.
    pub async fn group(&self, propositions: Vec<Proposition>) -> Result<Vec<Chunk>> {
        let limit = self.max_propositions.unwrap_or(usize::MAX);
        let total = propositions.len().min(limit);
        let mut chunks: Vec<Chunk> = Vec::new();

        for (done, proposition) in propositions.into_iter().take(limit).enumerate() {
            let selected = if chunks.is_empty() {
                None
            } else {
                self.select_chunk(&chunks, &proposition).await?
            };

            match selected {
                Some(index) => {
                    tracing::debug!(
                        "proposition {} joins chunk {}",
                        proposition.sequence_index,
                        chunks[index].short_id()
                    );
                    chunks[index].push(proposition);
                    self.refresh_chunk(&mut chunks[index]).await?;
                }
                None => {
                    let mut chunk = Chunk::seeded_with(proposition);
                    self.refresh_chunk(&mut chunk).await?;
                    tracing::debug!("opened chunk {} ({})", chunk.short_id(), chunk.title);
                    chunks.push(chunk);
                }
            }

            if (done + 1) % 25 == 0 {
                tracing::info!("grouped {}/{} propositions into {} chunks", done + 1, total, chunks.len());
            }
        }

        tracing::info!("grouping finished: {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Ask the service which open chunk (if any) the proposition belongs to.
    async fn select_chunk(
        &self,
        chunks: &[Chunk],
        proposition: &Proposition,
    ) -> Result<Option<usize>> {
        let mut listing = String::new();
        for chunk in chunks {
            listing.push_str(&format!(
                "- {}: {} ({})\n",
                chunk.short_id(),
                chunk.title,
                chunk.summary
            ));
        }

        let request = ChatRequest::new(vec![
            ChatMessage::system(SELECT_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Existing chunks:\n{listing}\nNew statement:\n{}",
                proposition.text
            )),
        ])
        .deterministic();

        let response = self.provider.chat(request).await?;

        match parse_selection(&response, chunks) {
            Ok(selection) => Ok(selection),
            Err(err) => {
                // Fail open to over-segmentation rather than mis-grouping.
                tracing::warn!("{err}; creating a new chunk");
                Ok(None)
            }
        }
    }

    /// Regenerate summary, then title, to reflect current membership.
    async fn refresh_chunk(&self, chunk: &mut Chunk) -> Result<()> {
        chunk.summary = self.generate_summary(chunk).await?;
        chunk.title = self.generate_title(chunk).await?;
        Ok(())
    }

    async fn generate_summary(&self, chunk: &Chunk) -> Result<String> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(
                "Write a one-sentence summary of what the following statements are about. \
Respond with the summary only.",
            ),
            ChatMessage::user(chunk.full_text()),
        ])
        .deterministic();

        let summary = self.provider.chat(request).await?;
        Ok(summary.trim().to_string())
    }

    async fn generate_title(&self, chunk: &Chunk) -> Result<String> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(
                "Write a title of a few words for a chunk with the following summary. \
Respond with the title only.",
            ),
            ChatMessage::user(chunk.summary.clone()),
        ])
        .deterministic();

        let title = self.provider.chat(request).await?;
        Ok(title.trim().to_string())
    }
}

/// Interpret a selection response against the open chunks.
///
/// Accepts exactly one known chunk id anywhere in the reply, or the word
/// NEW. Anything else (several ids, an unknown id, free-form prose) is
/// ambiguous.
fn parse_selection(
    response: &str,
    chunks: &[Chunk],
) -> std::result::Result<Option<usize>, RagError> {
    static ID_TOKEN: OnceLock<Regex> = OnceLock::new();
    let id_token = ID_TOKEN.get_or_init(|| Regex::new(r"[0-9a-fA-F]{8}").expect("valid regex"));

    let mut matched: Vec<usize> = Vec::new();
    for token in id_token.find_iter(response) {
        let token = token.as_str().to_ascii_lowercase();
        if let Some(index) = chunks.iter().position(|c| c.short_id() == token) {
            if !matched.contains(&index) {
                matched.push(index);
            }
        }
    }

    match matched.len() {
        1 => Ok(Some(matched[0])),
        0 => {
            let wants_new = response
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|w| w.eq_ignore_ascii_case("new"));
            if wants_new {
                Ok(None)
            } else {
                Err(RagError::AmbiguousGrouping(format!(
                    "no chunk id and no NEW in {response:?}"
                )))
            }
        }
        _ => Err(RagError::AmbiguousGrouping(format!(
            "multiple chunk ids in {response:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::stub::StubProvider;

    fn prop(text: &str, index: usize) -> Proposition {
        Proposition {
            text: text.to_string(),
            source_id: "doc".to_string(),
            sequence_index: index,
        }
    }

    fn chunker(stub: Arc<StubProvider>) -> AgenticChunker {
        AgenticChunker::new(stub)
    }

    #[tokio::test]
    async fn first_proposition_opens_a_chunk() {
        let stub = Arc::new(StubProvider::with_replies(["a summary", "A Title"]));
        let chunks = chunker(stub.clone())
            .group(vec![prop("Companies pay 30% income tax.", 0)])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].summary, "a summary");
        assert_eq!(chunks[0].title, "A Title");
        assert_eq!(chunks[0].len(), 1);
        // Summary + title, no selection call for the first proposition.
        assert_eq!(stub.chat_calls(), 2);
    }

    /// Test provider that always picks the first chunk listed in a
    /// selection prompt, and answers fixed text for summary/title prompts.
    struct JoinFirstChunk;

    #[async_trait::async_trait]
    impl LlmProvider for JoinFirstChunk {
        fn name(&self) -> &str {
            "join-first"
        }

        async fn health_check(&self) -> crate::core::errors::Result<bool> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest) -> crate::core::errors::Result<String> {
            let system = &request.messages[0].content;
            if system.contains("grouping short statements") {
                let listing = &request.messages[1].content;
                let id = Regex::new(r"[0-9a-f]{8}")
                    .unwrap()
                    .find(listing)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "NEW".to_string());
                Ok(id)
            } else {
                Ok("regenerated".to_string())
            }
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
        ) -> crate::core::errors::Result<tokio::sync::mpsc::Receiver<crate::core::errors::Result<String>>>
        {
            unimplemented!("not used in grouping tests")
        }

        async fn embed(
            &self,
            _inputs: &[String],
        ) -> crate::core::errors::Result<Vec<Vec<f32>>> {
            unimplemented!("not used in grouping tests")
        }
    }

    #[tokio::test]
    async fn matching_selection_appends_and_refreshes() {
        let chunks = AgenticChunker::new(Arc::new(JoinFirstChunk))
            .group(vec![
                prop("Companies pay income tax.", 0),
                prop("The rate is 30%.", 1),
            ])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
        // Membership keeps insertion order.
        let indices: Vec<usize> = chunks[0]
            .propositions
            .iter()
            .map(|p| p.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
        // Summary and title were regenerated after the append.
        assert_eq!(chunks[0].summary, "regenerated");
        assert_eq!(chunks[0].title, "regenerated");
    }

    #[tokio::test]
    async fn malformed_selection_falls_back_to_new_chunk() {
        let stub = Arc::new(StubProvider::with_replies([
            "s1",
            "t1",
            "these statements look thematically related, hard to say", // unparseable
            "s2",
            "t2",
        ]));

        let chunks = chunker(stub)
            .group(vec![prop("Tax on companies.", 0), prop("Stamp duty rules.", 1)])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn unknown_chunk_id_falls_back_to_new_chunk() {
        let stub = Arc::new(StubProvider::with_replies([
            "s1",
            "t1",
            "deadbeef", // well-formed id, but not an open chunk
            "s2",
            "t2",
        ]));

        let chunks = chunker(stub)
            .group(vec![prop("Tax on companies.", 0), prop("Stamp duty rules.", 1)])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn proposition_cap_limits_processing() {
        let stub = Arc::new(StubProvider::with_replies(["s1", "t1"]));
        let chunks = chunker(stub.clone())
            .with_limit(Some(1))
            .group(vec![prop("one", 0), prop("two", 1), prop("three", 2)])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(stub.chat_calls(), 2);
    }

    #[tokio::test]
    async fn grouping_preserves_global_order_within_chunks() {
        // NEW every time: each proposition opens its own chunk, and the
        // concatenation of members in chunk order reproduces input order.
        let stub = Arc::new(StubProvider::with_replies([
            "s1", "t1", "NEW", "s2", "t2", "NEW", "s3", "t3",
        ]));

        let chunks = chunker(stub)
            .group(vec![prop("a", 0), prop("b", 1), prop("c", 2)])
            .await
            .unwrap();

        let flattened: Vec<usize> = chunks
            .iter()
            .flat_map(|c| c.propositions.iter().map(|p| p.sequence_index))
            .collect();
        assert_eq!(flattened, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn service_failure_aborts_the_batch() {
        let stub = Arc::new(StubProvider::new());
        stub.set_chat_failure(true);

        let result = chunker(stub).group(vec![prop("a", 0)]).await;
        assert!(matches!(
            result,
            Err(RagError::ExternalService { .. })
        ));
    }

    #[test]
    fn selection_parsing_rules() {
        let mut a = Chunk::seeded_with(prop("x", 0));
        a.title = "T".into();
        let b = Chunk::seeded_with(prop("y", 1));
        let chunks = vec![a, b];
        let id_a = chunks[0].short_id();
        let id_b = chunks[1].short_id();

        assert_eq!(
            parse_selection(&format!("the answer is {id_a}"), &chunks).unwrap(),
            Some(0)
        );
        assert_eq!(parse_selection("NEW", &chunks).unwrap(), None);
        assert_eq!(parse_selection("new.", &chunks).unwrap(), None);
        assert!(parse_selection("no idea", &chunks).is_err());
        assert!(parse_selection(&format!("{id_a} or {id_b}"), &chunks).is_err());
    }
}
