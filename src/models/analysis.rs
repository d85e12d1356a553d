//! Analysis result models.
//!
//! `ChunkAnalysis` is the payload one provider call yields for one
//! chunk; `ChunkAnalysisResult` wraps it with scheduling metadata; the
//! integrator merges an ordered set of results into one
//! `IntegratedAnalysisResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A keyword as reported for a single chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkKeyword {
    pub term: String,
    /// Relevance in [0, 1] as judged by the provider.
    pub score: f64,
}

/// A knowledge-graph entity as reported for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntity {
    pub name: String,
    pub entity_type: String,
}

/// A knowledge-graph relation as reported for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
}

/// Validated provider output for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    #[serde(default)]
    pub keywords: Vec<ChunkKeyword>,
    pub summary: String,
    #[serde(default)]
    pub structure_notes: Option<String>,
    #[serde(default)]
    pub entities: Vec<ChunkEntity>,
    #[serde(default)]
    pub relations: Vec<ChunkRelation>,
}

/// Outcome of scheduling one chunk's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Ok,
    Failed,
}

/// One chunk's analysis outcome, ordered by `chunk_index` in the
/// orchestrator's output.
///
/// Failed results keep a null payload but still participate in
/// integration as an explicit gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAnalysisResult {
    pub chunk_index: usize,
    pub analysis: Option<ChunkAnalysis>,
    pub status: ChunkStatus,
    /// Provider attempts spent on this chunk (0 when never dispatched).
    pub attempt_count: u32,
    pub error: Option<String>,
}

impl ChunkAnalysisResult {
    pub fn ok(chunk_index: usize, analysis: ChunkAnalysis, attempt_count: u32) -> Self {
        Self {
            chunk_index,
            analysis: Some(analysis),
            status: ChunkStatus::Ok,
            attempt_count,
            error: None,
        }
    }

    pub fn failed(chunk_index: usize, attempt_count: u32, error: String) -> Self {
        Self {
            chunk_index,
            analysis: None,
            status: ChunkStatus::Failed,
            attempt_count,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ChunkStatus::Ok
    }
}

/// A merged keyword across chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Surface form chosen deterministically among the merged variants.
    pub term: String,
    /// Maximum score among merged variants.
    pub score: f64,
    /// Sorted union of the chunk indices that reported the keyword.
    pub source_chunks: Vec<usize>,
}

/// A merged knowledge-graph entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KgEntity {
    pub name: String,
    pub entity_type: String,
    /// How many chunk-level mentions were merged into this entry.
    pub mentions: usize,
    pub source_chunks: Vec<usize>,
}

/// A merged knowledge-graph relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KgRelation {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    /// Number of duplicate relations collapsed into this entry.
    pub evidence_count: usize,
}

/// Summary attached to one structural node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub node_id: usize,
    pub title: String,
    pub summary: String,
}

/// How much of the document the analysis actually covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub chunks_ok: usize,
    pub chunks_failed: usize,
}

impl CoverageStats {
    pub fn total(&self) -> usize {
        self.chunks_ok + self.chunks_failed
    }

    pub fn is_complete(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// The document-level analysis result.
///
/// Derived, never mutated after creation; a re-run produces a new
/// instance. All collections are deterministically ordered so two runs
/// over the same inputs produce identical merged content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedAnalysisResult {
    pub document_summary: String,
    pub keywords: Vec<Keyword>,
    pub entities: Vec<KgEntity>,
    pub relations: Vec<KgRelation>,
    pub section_summaries: Vec<SectionSummary>,
    pub coverage: CoverageStats,
    pub generated_at: DateTime<Utc>,
}
