//! taxchat-core: retrieval-augmented chat over Nigerian tax law documents.
//!
//! The crate covers both halves of a RAG chatbot:
//!
//! - **Build time** ([`pipeline::BuildPipeline`]): raw document text is split
//!   into propositions, grouped into titled/summarized chunks by an external
//!   reasoning service, embedded, and persisted to a SQLite vector store.
//! - **Query time** ([`chat::ChatService`]): a user question (plus the recent
//!   conversation) is condensed into a standalone question, the nearest
//!   chunks are retrieved, and a single chat-completion call produces an
//!   answer with citation-ordered sources.
//!
//! All hosted-model access goes through the [`llm::LlmProvider`] trait, so
//! the whole pipeline runs against a deterministic stub in tests. The chat
//! UI, document parsing, and launch scripts are external collaborators.

pub mod chat;
pub mod chunking;
pub mod core;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod rag;

pub use crate::chat::{ChatService, ConversationTurn, RetrievalResult, Role};
pub use crate::chunking::{AgenticChunker, Chunk, Proposition, PropositionSplitter, SourceDocument};
pub use crate::core::config::{AppConfig, AppPaths};
pub use crate::core::errors::{RagError, Result};
pub use crate::llm::{LlmProvider, OpenAiProvider};
pub use crate::pipeline::{BuildPipeline, BuildReport};
pub use crate::rag::{ChunkMatch, EmbeddingService, StoredChunk};
