//! Core data model for the analysis pipeline.
//!
//! Each pipeline stage produces one of these types; every persisted
//! artifact is independently serializable and re-derivable from the
//! previous stage's output.

mod analysis;
mod chunk;
mod document;
mod node;

pub use analysis::{
    ChunkAnalysis, ChunkAnalysisResult, ChunkEntity, ChunkKeyword, ChunkRelation, ChunkStatus,
    CoverageStats, IntegratedAnalysisResult, Keyword, KgEntity, KgRelation, SectionSummary,
};
pub use chunk::Chunk;
pub use document::{
    ArbitratedDocument, ArbitrationSummary, AttemptSummary, Heading, ParseAttempt, StructuralHints,
};
pub use node::{DocumentNode, DocumentTree, NodeLevel};
