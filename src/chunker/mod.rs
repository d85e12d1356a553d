//! Structure-preserving, budget-aware chunking.
//!
//! The chunker is pure computation over one arbitrated document:
//! identical input must produce identical output, because the chunk
//! list is cached by a content hash of its input. It never runs
//! concurrently and never calls out.

mod tokens;
mod tree;

pub use tokens::TokenEstimator;
pub use tree::build_tree;

use serde::{Deserialize, Serialize};

use crate::models::{ArbitratedDocument, Chunk, DocumentTree, NodeLevel};

/// Default per-chunk token budget.
pub const DEFAULT_TOKEN_BUDGET: usize = 2000;

/// Chunker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Per-chunk token budget.
    #[serde(default = "default_budget")]
    pub token_budget: usize,
    /// Character-to-token calibration.
    #[serde(default)]
    pub estimator: TokenEstimator,
}

fn default_budget() -> usize {
    DEFAULT_TOKEN_BUDGET
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            token_budget: default_budget(),
            estimator: TokenEstimator::default(),
        }
    }
}

impl ChunkerConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// The chunker's full output: the structural tree plus the ordered
/// chunk list. Serialized as one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub tree: DocumentTree,
    pub chunks: Vec<Chunk>,
}

/// One contiguous piece of text attributed to a node, the unit of
/// accumulation.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    node_id: usize,
    /// True for whole heading-derived leaf units, which are never
    /// split; plain text runs may be cut at paragraph or sentence
    /// boundaries.
    structural: bool,
}

/// Splits an arbitrated document into ordered, budget-respecting
/// chunks that follow its structure.
pub struct StructureChunker {
    estimator: TokenEstimator,
}

impl StructureChunker {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Chunk a document under the given budget.
    ///
    /// Small documents (estimate within budget) come back as a single
    /// chunk unless `force` is set; fragmenting them would only hurt
    /// cross-section context during integration.
    pub fn chunk(&self, doc: &ArbitratedDocument, token_budget: usize, force: bool) -> ChunkPlan {
        let tree = build_tree(&doc.text, &doc.hints);
        let total = self.estimator.estimate(&doc.text);

        if (total <= token_budget && !force) || doc.text.is_empty() {
            let chunks = vec![Chunk {
                index: 0,
                start: 0,
                end: doc.text.len(),
                node_ids: tree.pre_order(),
                text: doc.text.clone(),
                estimated_tokens: total,
                oversized: false,
            }];
            return ChunkPlan { tree, chunks };
        }

        let mut segments = Vec::new();
        self.collect_segments(&tree, 0, &doc.text, token_budget, &mut segments);

        let chunks = self.accumulate(&doc.text, &segments, token_budget);
        ChunkPlan { tree, chunks }
    }

    /// Pre-order walk emitting contiguous segments: a node's own text
    /// before, between, and after its children (plain), and whole leaf
    /// units (structural when heading-derived).
    fn collect_segments(
        &self,
        tree: &DocumentTree,
        node_id: usize,
        text: &str,
        budget: usize,
        out: &mut Vec<Segment>,
    ) {
        let node = tree.node(node_id);

        if node.is_leaf() {
            let structural = node.level != NodeLevel::Document && !node.implicit;
            if structural {
                self.push_segment(out, node.start, node.end, node_id, true);
            } else {
                self.push_plain(text, budget, out, node.start, node.end, node_id);
            }
            return;
        }

        let mut cursor = node.start;
        for &child_id in &node.children {
            let child_start = tree.node(child_id).start;
            self.push_plain(text, budget, out, cursor, child_start, node_id);
            self.collect_segments(tree, child_id, text, budget, out);
            cursor = tree.node(child_id).end;
        }
        self.push_plain(text, budget, out, cursor, node.end, node_id);
    }

    fn push_segment(
        &self,
        out: &mut Vec<Segment>,
        start: usize,
        end: usize,
        node_id: usize,
        structural: bool,
    ) {
        if start < end {
            out.push(Segment {
                start,
                end,
                node_id,
                structural,
            });
        }
    }

    /// Emit a plain text run, pre-split so no piece exceeds the
    /// budget: paragraph boundaries first, sentence boundaries next,
    /// hard character cuts as the last resort.
    fn push_plain(
        &self,
        text: &str,
        budget: usize,
        out: &mut Vec<Segment>,
        start: usize,
        end: usize,
        node_id: usize,
    ) {
        if start >= end {
            return;
        }
        if self.estimator.estimate(&text[start..end]) <= budget {
            self.push_segment(out, start, end, node_id, false);
            return;
        }

        for (piece_start, piece_end) in split_plain(text, start, end, budget, &self.estimator) {
            self.push_segment(out, piece_start, piece_end, node_id, false);
        }
    }

    /// Greedy accumulation of segments into chunks. Overflow closes
    /// the current chunk at the last segment boundary; a structural
    /// unit alone exceeding the budget becomes its own flagged chunk.
    fn accumulate(&self, text: &str, segments: &[Segment], budget: usize) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();

        let mut cur_start: Option<usize> = None;
        let mut cur_end = 0usize;
        let mut cur_tokens = 0usize;
        let mut cur_nodes: Vec<usize> = Vec::new();

        let mut flush =
            |start: &mut Option<usize>, end: usize, nodes: &mut Vec<usize>, chunks: &mut Vec<Chunk>| {
                if let Some(s) = start.take() {
                    let chunk_text = text[s..end].to_string();
                    chunks.push(Chunk {
                        index: chunks.len(),
                        start: s,
                        end,
                        node_ids: std::mem::take(nodes),
                        estimated_tokens: self.estimator.estimate(&chunk_text),
                        text: chunk_text,
                        oversized: false,
                    });
                }
            };

        for seg in segments {
            let seg_tokens = self.estimator.estimate(&text[seg.start..seg.end]);

            if seg.structural && seg_tokens > budget {
                // Oversized structural unit: emit whole and flagged,
                // never truncated.
                flush(&mut cur_start, cur_end, &mut cur_nodes, &mut chunks);
                let chunk_text = text[seg.start..seg.end].to_string();
                chunks.push(Chunk {
                    index: chunks.len(),
                    start: seg.start,
                    end: seg.end,
                    node_ids: vec![seg.node_id],
                    estimated_tokens: seg_tokens,
                    text: chunk_text,
                    oversized: true,
                });
                cur_tokens = 0;
                continue;
            }

            if cur_start.is_some() && cur_tokens + seg_tokens > budget {
                flush(&mut cur_start, cur_end, &mut cur_nodes, &mut chunks);
                cur_tokens = 0;
            }

            if cur_start.is_none() {
                cur_start = Some(seg.start);
            }
            cur_end = seg.end;
            cur_tokens += seg_tokens;
            if !cur_nodes.contains(&seg.node_id) {
                cur_nodes.push(seg.node_id);
            }
        }

        flush(&mut cur_start, cur_end, &mut cur_nodes, &mut chunks);
        chunks
    }
}

/// Split a plain text run into budget-respecting pieces, preferring
/// paragraph boundaries, then sentence boundaries, then hard cuts.
fn split_plain(
    text: &str,
    start: usize,
    end: usize,
    budget: usize,
    estimator: &TokenEstimator,
) -> Vec<(usize, usize)> {
    let mut pieces = Vec::new();

    for (p_start, p_end) in boundaries(text, start, end, "\n\n") {
        if estimator.estimate(&text[p_start..p_end]) <= budget {
            pieces.push((p_start, p_end));
            continue;
        }
        for (s_start, s_end) in sentence_spans(text, p_start, p_end) {
            if estimator.estimate(&text[s_start..s_end]) <= budget {
                pieces.push((s_start, s_end));
            } else {
                hard_cut(text, s_start, s_end, budget, estimator, &mut pieces);
            }
        }
    }

    merge_adjacent_under_budget(text, pieces, budget, estimator)
}

/// Spans separated by a delimiter, delimiter attached to the preceding
/// span so the pieces stay contiguous.
fn boundaries(text: &str, start: usize, end: usize, delim: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = start;
    let slice = &text[start..end];
    let mut search = 0usize;

    while let Some(pos) = slice[search..].find(delim) {
        let cut = start + search + pos + delim.len();
        spans.push((cursor, cut));
        cursor = cut;
        search = cut - start;
    }
    if cursor < end {
        spans.push((cursor, end));
    }
    spans
}

/// Sentence spans: cut after terminal punctuation followed by
/// whitespace. Handles Latin terminators and the ideographic full
/// stop.
fn sentence_spans(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = start;
    let mut prev_terminal = false;

    for (i, c) in text[start..end].char_indices() {
        let abs = start + i;
        if prev_terminal && c.is_whitespace() {
            let cut = abs + c.len_utf8();
            spans.push((cursor, cut));
            cursor = cut;
            prev_terminal = false;
            continue;
        }
        prev_terminal = matches!(c, '.' | '!' | '?' | '。' | '！' | '？');
    }
    if cursor < end {
        spans.push((cursor, end));
    }
    spans
}

/// Last resort: cut at character boundaries so every piece fits.
fn hard_cut(
    text: &str,
    start: usize,
    end: usize,
    budget: usize,
    estimator: &TokenEstimator,
    out: &mut Vec<(usize, usize)>,
) {
    let mut piece_start = start;
    let mut last_boundary = start;

    for (i, c) in text[start..end].char_indices() {
        let abs = start + i + c.len_utf8();
        if estimator.estimate(&text[piece_start..abs]) > budget && last_boundary > piece_start {
            out.push((piece_start, last_boundary));
            piece_start = last_boundary;
        }
        last_boundary = abs;
    }
    if piece_start < end {
        out.push((piece_start, end));
    }
}

/// Re-join adjacent small pieces while they stay under budget, so a
/// paragraph split doesn't shatter into one chunk per sentence.
fn merge_adjacent_under_budget(
    text: &str,
    pieces: Vec<(usize, usize)>,
    budget: usize,
    estimator: &TokenEstimator,
) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in pieces {
        if let Some(last) = merged.last_mut() {
            if last.1 == start && estimator.estimate(&text[last.0..end]) <= budget {
                last.1 = end;
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}
