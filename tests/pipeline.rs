//! End-to-end pipeline tests with stub parsers, OCR engines, and
//! providers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use doclens::analysis::{
    AnalysisProvider, ChunkAnalysisOrchestrator, OrchestratorConfig, ProviderError,
};
use doclens::cache::MemoryCache;
use doclens::chunker::ChunkerConfig;
use doclens::models::{ParseAttempt, StructuralHints};
use doclens::ocr::{OcrEngine, OcrError, OcrManager, OcrPageResult};
use doclens::parsing::{
    ParseError, ParserAdapter, ParserOutput, ParserRegistry, ParsingArbiter,
};
use doclens::pipeline::{AnalysisPipeline, AnalysisRequest, PipelineError, PipelineOptions};

// ---------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------

/// Provider that answers with a JSON payload derived from the prompt,
/// failing permanently for prompts containing FAILCHUNK.
struct MarkerProvider {
    calls: AtomicUsize,
}

impl MarkerProvider {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalysisProvider for MarkerProvider {
    async fn complete(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if prompt.contains("FAILCHUNK") {
            return Err(ProviderError::Timeout);
        }

        // Find the section marker embedded in the chunk text.
        let marker = (0..16)
            .map(|i| format!("topic{}", i))
            .find(|m| prompt.contains(m.as_str()))
            .unwrap_or_else(|| "general".to_string());

        Ok(format!(
            r#"{{"keywords":[{{"term":"{m}","score":0.9}},{{"term":"shared","score":0.5}}],"summary":"Covers {m} in detail.","entities":[{{"name":"{m} system","entity_type":"system"}}],"relations":[]}}"#,
            m = marker
        ))
    }
}

/// Parser adapter with a canned response, for driving arbitration
/// directly.
struct StubAdapter {
    id: &'static str,
    priority: u8,
    mime: &'static str,
    text: String,
    hints: StructuralHints,
    fail: bool,
}

impl ParserAdapter for StubAdapter {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn supports(&self, mime: &str) -> bool {
        mime == self.mime
    }

    fn parse(&self, _path: &Path) -> Result<ParserOutput, ParseError> {
        if self.fail {
            return Err(ParseError::ExtractionFailed("stub failure".to_string()));
        }
        Ok(ParserOutput {
            text: self.text.clone(),
            hints: self.hints.clone(),
        })
    }
}

/// OCR engine that records which pages it recognized.
struct StubOcr {
    pages_seen: Arc<AtomicUsize>,
}

impl OcrEngine for StubOcr {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        "stub engine".to_string()
    }

    fn recognize_pdf_page(
        &self,
        _pdf: &Path,
        page: u32,
        _languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        self.pages_seen.fetch_add(1, Ordering::SeqCst);
        Ok(OcrPageResult {
            text: format!("Recognized text of page {} with plenty of words.", page),
            confidence: Some(0.9),
        })
    }

    fn recognize_image(
        &self,
        _image: &Path,
        _languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        Ok(OcrPageResult {
            text: "image text".to_string(),
            confidence: Some(0.9),
        })
    }
}

fn stub_ocr_manager(pages_seen: Arc<AtomicUsize>) -> OcrManager {
    OcrManager::from_engines(Box::new(StubOcr { pages_seen }), None, "eng", 0.35)
}

fn orchestrator(provider: Arc<dyn AnalysisProvider>) -> ChunkAnalysisOrchestrator {
    ChunkAnalysisOrchestrator::new(
        provider,
        OrchestratorConfig {
            workers: 2,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
            ..Default::default()
        },
    )
}

fn pipeline_with(
    registry: ParserRegistry,
    provider: Arc<dyn AnalysisProvider>,
    pages_seen: Arc<AtomicUsize>,
) -> AnalysisPipeline {
    let arbiter = ParsingArbiter::new(registry, Arc::new(stub_ocr_manager(pages_seen)));
    AnalysisPipeline::new(
        arbiter,
        orchestrator(provider),
        Arc::new(MemoryCache::new()),
        ChunkerConfig::default(),
        "stub-model".to_string(),
    )
}

/// Markdown document with four sections; section 2 carries the
/// provider failure marker.
fn four_section_markdown() -> String {
    let mut text = String::new();
    for i in 0..4 {
        text.push_str(&format!("# Section {}\n\n", i));
        let marker = if i == 2 { "FAILCHUNK".to_string() } else { format!("topic{}", i) };
        for _ in 0..12 {
            text.push_str(&format!("This part discusses {} and its details. ", marker));
        }
        text.push_str("\n\n");
    }
    text
}

// ---------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------

#[tokio::test]
async fn test_partial_failure_yields_best_effort_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.md");
    std::fs::write(&path, four_section_markdown()).unwrap();

    let provider = Arc::new(MarkerProvider::new());
    let pipeline = pipeline_with(
        ParserRegistry::with_defaults(),
        provider.clone(),
        Arc::new(AtomicUsize::new(0)),
    );

    let request = AnalysisRequest::new(&path).with_options(PipelineOptions {
        token_budget: Some(150),
        ..Default::default()
    });
    let result = pipeline.run(request).await.unwrap();

    // One chunk exhausted its 3 attempts; the rest succeeded.
    assert_eq!(result.coverage.chunks_failed, 1);
    assert_eq!(result.coverage.chunks_ok, 3);

    // The surviving chunks' keywords are all present.
    let terms: Vec<&str> = result.keywords.iter().map(|k| k.term.as_str()).collect();
    for expected in ["topic0", "topic1", "topic3", "shared"] {
        assert!(terms.contains(&expected), "missing keyword {}", expected);
    }

    // "shared" was reported by all three ok chunks and merged into a
    // single entry with the union of sources.
    let shared = result.keywords.iter().find(|k| k.term == "shared").unwrap();
    assert_eq!(shared.source_chunks.len(), 3);

    // The failed chunk shows up as an explicit gap, not silence.
    assert!(result.document_summary.contains("[analysis unavailable]"));
}

#[tokio::test]
async fn test_scanned_document_goes_through_full_page_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.pdf");
    // Real PDF magic bytes so MIME detection routes to the PDF
    // adapters; the stub adapter supplies the parse result.
    std::fs::write(&path, b"%PDF-1.4 stub content").unwrap();

    // 3 pages, 20 extractable chars/page, 8 image tags/page.
    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(StubAdapter {
        id: "stub-pdf",
        priority: 0,
        mime: "application/pdf",
        text: "a".repeat(60),
        hints: StructuralHints {
            page_count: Some(3),
            image_count: 24,
            ..Default::default()
        },
        fail: false,
    }));

    let pages_seen = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(registry, Arc::new(MarkerProvider::new()), pages_seen.clone());

    let request = AnalysisRequest::new(&path);
    let (document, summary) = pipeline.arbitrate_stage(&request).await.unwrap();

    assert!(document.is_scanned);
    assert!(summary.is_scanned);
    // Full-page OCR touched all 3 pages.
    assert_eq!(pages_seen.load(Ordering::SeqCst), 3);
    // OCR output is authoritative regardless of score; the parser's
    // score survives as diagnostics.
    assert_eq!(document.chosen_parser_id, "ocr-stub");
    assert!(document.text.contains("Recognized text of page 3"));
    assert!(document.runner_up_score.is_some());
}

#[tokio::test]
async fn test_higher_scoring_parser_wins_arbitration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.4 stub content").unwrap();

    let clean = "The maintenance report describes scheduled downtime, \
                 affected services, and recovery procedures in detail. "
        .repeat(20);
    let garbled = "Th\u{FFFD}\u{0001} ma\u{FFFD}nt\u{0002}n\u{FFFD}nc\u{FFFD}\u{0003}\u{FFFD}
        \u{FFFD}\u{FFFD}rt\u{0001}\u{FFFD}"
        .repeat(30);

    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(StubAdapter {
        id: "garbled",
        priority: 0, // better priority, worse text
        mime: "application/pdf",
        text: garbled,
        hints: StructuralHints {
            page_count: Some(1),
            ..Default::default()
        },
        fail: false,
    }));
    registry.register(Arc::new(StubAdapter {
        id: "clean",
        priority: 1,
        mime: "application/pdf",
        text: clean,
        hints: StructuralHints {
            page_count: Some(1),
            ..Default::default()
        },
        fail: false,
    }));

    let pipeline = pipeline_with(
        registry,
        Arc::new(MarkerProvider::new()),
        Arc::new(AtomicUsize::new(0)),
    );
    let request = AnalysisRequest::new(&path);
    let (document, summary) = pipeline.arbitrate_stage(&request).await.unwrap();

    assert_eq!(document.chosen_parser_id, "clean");
    assert!(!document.is_scanned);
    let clean_score = summary
        .attempts
        .iter()
        .find(|a| a.parser_id == "clean")
        .unwrap()
        .quality_score;
    let garbled_score = summary
        .attempts
        .iter()
        .find(|a| a.parser_id == "garbled")
        .unwrap()
        .quality_score;
    assert!(clean_score > garbled_score);
}

#[tokio::test]
async fn test_one_failing_adapter_does_not_abort_arbitration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.4 stub content").unwrap();

    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(StubAdapter {
        id: "broken",
        priority: 0,
        mime: "application/pdf",
        text: String::new(),
        hints: StructuralHints::default(),
        fail: true,
    }));
    registry.register(Arc::new(StubAdapter {
        id: "working",
        priority: 1,
        mime: "application/pdf",
        text: "Plenty of readable text in this working attempt. ".repeat(20),
        hints: StructuralHints {
            page_count: Some(1),
            ..Default::default()
        },
        fail: false,
    }));

    let pipeline = pipeline_with(
        registry,
        Arc::new(MarkerProvider::new()),
        Arc::new(AtomicUsize::new(0)),
    );
    let (document, summary) = pipeline
        .arbitrate_stage(&AnalysisRequest::new(&path))
        .await
        .unwrap();

    assert_eq!(document.chosen_parser_id, "working");
    assert_eq!(summary.attempts.len(), 2);
    assert!(summary.attempts.iter().any(|a| !a.succeeded));
}

#[tokio::test]
async fn test_all_adapters_failing_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.4 stub content").unwrap();

    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(StubAdapter {
        id: "broken",
        priority: 0,
        mime: "application/pdf",
        text: String::new(),
        hints: StructuralHints::default(),
        fail: true,
    }));

    let pipeline = pipeline_with(
        registry,
        Arc::new(MarkerProvider::new()),
        Arc::new(AtomicUsize::new(0)),
    );
    let err = pipeline
        .run(AnalysisRequest::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));
}

#[tokio::test]
async fn test_small_document_single_chunk_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.md");
    std::fs::write(&path, "# Note\n\nA short note about topic0 only.\n").unwrap();

    let provider = Arc::new(MarkerProvider::new());
    let pipeline = pipeline_with(
        ParserRegistry::with_defaults(),
        provider.clone(),
        Arc::new(AtomicUsize::new(0)),
    );

    let result = pipeline.run(AnalysisRequest::new(&path)).await.unwrap();
    assert_eq!(result.coverage.chunks_ok, 1);
    assert_eq!(result.coverage.chunks_failed, 0);
    // Exactly one provider call for a document within budget.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stage_cache_prevents_repeat_provider_calls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.md");
    std::fs::write(&path, "# Cached\n\nBody text about topic1 for caching.\n").unwrap();

    let provider = Arc::new(MarkerProvider::new());
    let pipeline = pipeline_with(
        ParserRegistry::with_defaults(),
        provider.clone(),
        Arc::new(AtomicUsize::new(0)),
    );

    let first = pipeline.run(AnalysisRequest::new(&path)).await.unwrap();
    let calls_after_first = provider.calls.load(Ordering::SeqCst);
    let second = pipeline.run(AnalysisRequest::new(&path)).await.unwrap();

    // Second run is served from the stage caches end to end.
    assert_eq!(provider.calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(first.document_summary, second.document_summary);
    assert_eq!(first.keywords, second.keywords);
    assert_eq!(first.generated_at, second.generated_at);
}

#[tokio::test]
async fn test_reanalyze_bypasses_chunk_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.md");
    std::fs::write(&path, "# Fresh\n\nBody text about topic2 to reanalyze.\n").unwrap();

    let provider = Arc::new(MarkerProvider::new());
    let pipeline = pipeline_with(
        ParserRegistry::with_defaults(),
        provider.clone(),
        Arc::new(AtomicUsize::new(0)),
    );

    pipeline.run(AnalysisRequest::new(&path)).await.unwrap();
    let calls_after_first = provider.calls.load(Ordering::SeqCst);

    let request = AnalysisRequest::new(&path).with_options(PipelineOptions {
        reanalyze: true,
        ..Default::default()
    });
    pipeline.run(request).await.unwrap();

    assert!(provider.calls.load(Ordering::SeqCst) > calls_after_first);
}

#[tokio::test]
async fn test_retry_attempt_accounting() {
    // The failed chunk must show exactly max_attempts attempts.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.md");
    std::fs::write(&path, four_section_markdown()).unwrap();

    let arbiter = ParsingArbiter::new(
        ParserRegistry::with_defaults(),
        Arc::new(stub_ocr_manager(Arc::new(AtomicUsize::new(0)))),
    );
    let pipeline = AnalysisPipeline::new(
        arbiter,
        orchestrator(Arc::new(MarkerProvider::new())),
        Arc::new(MemoryCache::new()),
        ChunkerConfig::default(),
        "stub-model".to_string(),
    );

    let request = AnalysisRequest::new(&path).with_options(PipelineOptions {
        token_budget: Some(150),
        ..Default::default()
    });
    let (document, _) = pipeline.arbitrate_stage(&request).await.unwrap();
    let plan = pipeline.chunk_stage(&request, &document).await;
    assert_eq!(plan.chunks.len(), 4);

    let results = orchestrator(Arc::new(MarkerProvider::new()))
        .analyze(&plan.chunks, &plan.tree, None, None)
        .await;

    let failed: Vec<_> = results.iter().filter(|r| !r.is_ok()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempt_count, 3);
    assert_eq!(failed[0].chunk_index, 2);
}

/// Arbitration attempts are immutable data; sanity-check the summary
/// view over a handcrafted attempt.
#[test]
fn test_attempt_summary_reflects_attempt() {
    let attempt = ParseAttempt::failed("pdf-raw", "tool missing".to_string());
    let summary: doclens::models::AttemptSummary = (&attempt).into();
    assert_eq!(summary.parser_id, "pdf-raw");
    assert!(!summary.succeeded);
    assert_eq!(summary.error.as_deref(), Some("tool missing"));
}
