//! doclens - document analysis pipeline.
//!
//! Ingests heterogeneous documents (PDF, DOCX, HTML, Markdown, plain
//! text) and produces a hierarchically organized analysis: keywords,
//! summaries, a structural outline, and knowledge-graph entities and
//! relations.
//!
//! The pipeline has four stages:
//!
//! 1. [`parsing`] — every registered parser runs; a quality score
//!    arbitrates, with scanned-document detection and OCR fallback
//! 2. [`chunker`] — structure-preserving, token-budget-aware chunking
//! 3. [`analysis`] — per-chunk calls to an external inference
//!    provider with bounded concurrency and retry/backoff
//! 4. [`integrate`] — deterministic merge into one document-level
//!    result
//!
//! [`pipeline::AnalysisPipeline`] wires the stages together behind a
//! content-addressed stage cache.

pub mod analysis;
pub mod cache;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod integrate;
pub mod models;
pub mod ocr;
pub mod parsing;
pub mod pipeline;
pub mod utils;

pub use pipeline::{AnalysisPipeline, AnalysisRequest, PipelineError, PipelineEvent, PipelineOptions};
