//! Chunk model: one budget-respecting slice of a document.

use serde::{Deserialize, Serialize};

/// A contiguous slice of the arbitrated document text, the unit of
/// analysis.
///
/// Chunks for one document are produced in strictly increasing,
/// non-overlapping order; their ranges union to the full text range
/// exactly. `estimated_tokens` stays within the configured budget
/// except for `oversized` chunks, which carry a single structural unit
/// that alone exceeds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based, contiguous chunk index.
    pub index: usize,
    /// Start byte offset into the document text (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Ids of the `DocumentNode`s this chunk covers, in document order.
    pub node_ids: Vec<usize>,
    /// The chunk text itself.
    pub text: String,
    /// Deterministic token estimate for the text.
    pub estimated_tokens: usize,
    /// Set when a single structural unit exceeded the token budget and
    /// was emitted whole rather than truncated.
    pub oversized: bool,
}

impl Chunk {
    /// Whether this chunk's range covers any part of the given node
    /// range.
    pub fn covers_node(&self, node_id: usize) -> bool {
        self.node_ids.contains(&node_id)
    }

    /// Byte length of the chunk's range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
