//! Document chunking: proposition extraction and agentic grouping.

pub mod grouper;
pub mod splitter;
pub mod types;

pub use grouper::AgenticChunker;
pub use splitter::PropositionSplitter;
pub use types::{Chunk, Proposition, SourceDocument};

/// Human-readable outline of grouped chunks, for hosts that want to show
/// the grouping result after a build.
pub fn outline(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&format!(
            "[{}] {} ({} propositions)\n    {}\n",
            chunk.short_id(),
            chunk.title,
            chunk.len(),
            chunk.summary
        ));
    }
    out
}
