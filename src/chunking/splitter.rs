//! Proposition extraction.
//!
//! Splits raw document text into overlapping windows, preferring to cut at
//! paragraph, line, or sentence boundaries so each proposition reads as a
//! self-contained statement.

use crate::core::config::ChunkingConfig;

use super::types::{Proposition, SourceDocument};

/// Boundary preference when trimming a window, strongest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

pub struct PropositionSplitter {
    size: usize,
    overlap: usize,
}

impl PropositionSplitter {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            size: config.proposition_size.max(1),
            overlap: config.proposition_overlap.min(config.proposition_size.saturating_sub(1)),
        }
    }

    /// Split all documents in input order into one flat proposition sequence
    /// with globally increasing sequence indices.
    pub fn split(&self, documents: &[SourceDocument]) -> Vec<Proposition> {
        let mut propositions = Vec::new();
        let mut next_index = 0;

        for doc in documents {
            let before = propositions.len();
            self.split_document(doc, &mut next_index, &mut propositions);
            tracing::debug!(
                "extracted {} propositions from {}",
                propositions.len() - before,
                doc.source_id
            );
        }

        tracing::info!(
            "extracted {} propositions from {} documents",
            propositions.len(),
            documents.len()
        );
        propositions
    }

    fn split_document(
        &self,
        doc: &SourceDocument,
        next_index: &mut usize,
        out: &mut Vec<Proposition>,
    ) {
        let chars: Vec<char> = doc.text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return;
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut start = 0;

        while start < total {
            let end = (start + self.size).min(total);
            let window: String = chars[start..end].iter().collect();

            // Trim the window back to a natural boundary unless it already
            // reaches the end of the document.
            let text = if end < total {
                trim_to_boundary(&window)
            } else {
                window
            };

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(Proposition {
                    text: trimmed.to_string(),
                    source_id: doc.source_id.clone(),
                    sequence_index: *next_index,
                });
                *next_index += 1;
            }

            start += step;
        }
    }
}

/// Cut the window at the strongest separator found in its last fifth, so
/// consecutive propositions break on paragraph or sentence seams instead of
/// mid-word.
fn trim_to_boundary(text: &str) -> String {
    let search_start = (text.len() * 4) / 5;
    // Stay on a char boundary when slicing.
    let search_start = (search_start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    let tail = &text[search_start..];

    for sep in SEPARATORS {
        if let Some(pos) = tail.rfind(sep) {
            let cut = search_start + pos + sep.len();
            return text[..cut].to_string();
        }
    }

    text.to_string()
}
