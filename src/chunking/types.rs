use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw text handed over by the document-source collaborator.
///
/// The core does not parse files; whatever extracted the text supplies it
/// here together with a stable identifier (filename, URL, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// A short self-contained statement extracted from a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub text: String,
    pub source_id: String,
    /// Global position in extraction order, strictly increasing across
    /// documents.
    pub sequence_index: usize,
}

/// A titled, summarized group of propositions treated as one retrievable
/// unit.
///
/// Mutable only while the grouper owns it: membership is append-only and
/// never reordered, and title/summary are regenerated as members arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub propositions: Vec<Proposition>,
}

impl Chunk {
    /// Start a chunk from its first member. Title and summary are filled in
    /// by the grouper right after creation.
    pub fn seeded_with(proposition: Proposition) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            summary: String::new(),
            propositions: vec![proposition],
        }
    }

    /// Short identifier shown to (and echoed back by) the reasoning service.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Member texts concatenated in insertion order.
    pub fn full_text(&self) -> String {
        self.propositions
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Distinct source documents contributing to this chunk, in first-seen
    /// order.
    pub fn source_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for p in &self.propositions {
            if !seen.contains(&p.source_id) {
                seen.push(p.source_id.clone());
            }
        }
        seen
    }

    pub fn push(&mut self, proposition: Proposition) {
        self.propositions.push(proposition);
    }

    pub fn len(&self) -> usize {
        self.propositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.propositions.is_empty()
    }
}
