//! Parser arbitration.
//!
//! Every adapter registered for a file's type runs independently; the
//! arbiter scores each attempt, detects scanned documents, optionally
//! routes through full-page OCR, and selects one authoritative text.
//! Selection is an explicit function over the attempt set, never
//! exception-driven fallback.

mod adapter;
mod docx;
mod html;
mod markdown;
mod pdf;
mod quality;
mod scan;
mod text;

pub use adapter::{ParseError, ParserAdapter, ParserOutput, ParserRegistry};
pub use quality::QualityScorer;
pub use scan::ScanDetector;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    ArbitratedDocument, ArbitrationSummary, AttemptSummary, ParseAttempt, StructuralHints,
};
use crate::ocr::{OcrError, OcrManager};
use crate::utils::detect_mime;

/// Default size of the pool running adapters for one file.
pub const DEFAULT_PARSE_WORKERS: usize = 3;

/// Errors terminating an arbitration.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Every applicable adapter failed; nothing downstream can run.
    #[error("all parsers failed for {file}: {}", summarize_errors(.attempts))]
    AllParsersFailed {
        file: String,
        attempts: Vec<AttemptSummary>,
    },

    #[error("no parser registered for MIME type {0}")]
    NoAdapters(String),

    #[error("scanned document OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

fn summarize_errors(attempts: &[AttemptSummary]) -> String {
    attempts
        .iter()
        .map(|a| {
            format!(
                "{}: {}",
                a.parser_id,
                a.error.as_deref().unwrap_or("no output")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs all applicable adapters for a file and arbitrates the results.
pub struct ParsingArbiter {
    registry: ParserRegistry,
    scorer: QualityScorer,
    detector: ScanDetector,
    ocr: Arc<OcrManager>,
    workers: usize,
}

impl ParsingArbiter {
    pub fn new(registry: ParserRegistry, ocr: Arc<OcrManager>) -> Self {
        Self {
            registry,
            scorer: QualityScorer::new(),
            detector: ScanDetector::new(),
            ocr,
            workers: DEFAULT_PARSE_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Arbitrate one file: run adapters, score, detect scans, select.
    ///
    /// Returns the arbitrated document together with the persisted
    /// summary of every attempt.
    pub async fn arbitrate(
        &self,
        path: &Path,
    ) -> Result<(ArbitratedDocument, ArbitrationSummary), ArbiterError> {
        let content = std::fs::read(path).map_err(|source| ArbiterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let content_hash = ArbitratedDocument::compute_hash(&content);
        let mime = detect_mime(path, &content[..content.len().min(8192)]);
        drop(content);

        let adapters = self.registry.for_mime(&mime);
        if adapters.is_empty() {
            return Err(ArbiterError::NoAdapters(mime));
        }
        let priority_order: Vec<String> = adapters.iter().map(|a| a.id().to_string()).collect();

        let attempts = self.run_attempts(path, &adapters).await;

        let best = match select_best(&attempts, &priority_order) {
            Some(best) => best,
            None => {
                return Err(ArbiterError::AllParsersFailed {
                    file: path.display().to_string(),
                    attempts: attempts.iter().map(AttemptSummary::from).collect(),
                });
            }
        };

        let is_scanned =
            mime == "application/pdf" && self.detector.is_scanned(&best.hints, &best.text);

        let (document, chosen_id) = if is_scanned {
            let doc = self.ocr_document(path, &content_hash, best).await?;
            let id = doc.chosen_parser_id.clone();
            (doc, id)
        } else {
            let doc = ArbitratedDocument {
                source_file: path.to_path_buf(),
                content_hash,
                chosen_parser_id: best.parser_id.clone(),
                text: best.text.clone(),
                hints: best.hints.clone(),
                is_scanned: false,
                runner_up_score: None,
            };
            (doc, best.parser_id.clone())
        };

        let summary = ArbitrationSummary {
            attempts: attempts.iter().map(AttemptSummary::from).collect(),
            chosen_parser_id: chosen_id,
            is_scanned,
        };

        tracing::info!(
            "Arbitrated {} via {} (score {:.2}, scanned: {})",
            path.display(),
            summary.chosen_parser_id,
            best.quality_score,
            is_scanned
        );

        Ok((document, summary))
    }

    /// Run each adapter in its own blocking task, bounded by the
    /// worker pool size. A failure (or panic) in one adapter never
    /// aborts the others.
    async fn run_attempts(
        &self,
        path: &Path,
        adapters: &[Arc<dyn ParserAdapter>],
    ) -> Vec<ParseAttempt> {
        let mut attempts = Vec::with_capacity(adapters.len());

        for batch in adapters.chunks(self.workers) {
            let mut handles = Vec::with_capacity(batch.len());
            for adapter in batch {
                let adapter = adapter.clone();
                let path = path.to_path_buf();
                handles.push(tokio::task::spawn_blocking(move || {
                    match adapter.parse(&path) {
                        Ok(output) => {
                            ParseAttempt::succeeded(adapter.id(), output.text, output.hints)
                        }
                        Err(e) => ParseAttempt::failed(adapter.id(), e.to_string()),
                    }
                }));
            }

            // Barrier: scores are only compared once all attempts in
            // flight have completed.
            for (handle, adapter) in handles.into_iter().zip(batch) {
                match handle.await {
                    Ok(mut attempt) => {
                        if attempt.succeeded {
                            attempt.quality_score = self.scorer.score(&attempt.sample);
                        }
                        attempts.push(attempt);
                    }
                    Err(e) => {
                        tracing::warn!("Parser {} panicked: {}", adapter.id(), e);
                        attempts
                            .push(ParseAttempt::failed(adapter.id(), format!("panicked: {}", e)));
                    }
                }
            }
        }

        attempts
    }

    /// Full-page OCR for a scanned document. The OCR text is
    /// authoritative regardless of its numeric score; the best parser
    /// attempt's score is retained for diagnostics.
    async fn ocr_document(
        &self,
        path: &Path,
        content_hash: &str,
        best: &ParseAttempt,
    ) -> Result<ArbitratedDocument, ArbiterError> {
        let page_count = best
            .hints
            .page_count
            .unwrap_or(1);

        let ocr = self.ocr.clone();
        let pdf_path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || ocr.ocr_document(&pdf_path, page_count))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("OCR task panicked: {}", e)))??;

        tracing::info!(
            "OCR'd {} pages via {} ({} failed)",
            result.pages_ok,
            result.engine,
            result.pages_failed
        );

        // Heading offsets from the parser attempt point into the
        // replaced text; rebuild hints against the OCR output.
        let hints = StructuralHints {
            headings: adapter::detect_text_headings(&result.text),
            table_count: best.hints.table_count,
            image_count: best.hints.image_count,
            page_count: Some(page_count),
        };

        Ok(ArbitratedDocument {
            source_file: path.to_path_buf(),
            content_hash: content_hash.to_string(),
            chosen_parser_id: format!("ocr-{}", result.engine),
            text: result.text,
            hints,
            is_scanned: true,
            runner_up_score: Some(best.quality_score),
        })
    }
}

/// Explicit selection over a set of attempts: the succeeded attempt
/// with the strictly highest quality score wins; exact ties fall back
/// to the fixed adapter priority order for the file type.
pub fn select_best<'a>(
    attempts: &'a [ParseAttempt],
    priority_order: &[String],
) -> Option<&'a ParseAttempt> {
    let priority = |id: &str| {
        priority_order
            .iter()
            .position(|p| p == id)
            .unwrap_or(usize::MAX)
    };

    attempts
        .iter()
        .filter(|a| a.succeeded)
        .min_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| priority(&a.parser_id).cmp(&priority(&b.parser_id)))
        })
}
