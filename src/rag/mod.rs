//! Vector storage and retrieval.
//!
//! - `store`: persisted chunk types and the `VectorStore` abstraction
//! - `sqlite`: the SQLite implementation
//! - `service`: `EmbeddingService` tying the embedding provider to the store
//!   (build / load / query)

pub mod service;
pub mod sqlite;
pub mod store;

pub use service::EmbeddingService;
pub use sqlite::SqliteChunkStore;
pub use store::{ChunkMatch, StoredChunk, VectorStore};
