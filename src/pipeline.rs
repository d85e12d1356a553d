//! The document-to-analysis pipeline.
//!
//! One `AnalysisPipeline` instance serves any number of documents;
//! everything request-scoped travels in the `AnalysisRequest` threaded
//! through the stages, so concurrent documents never share in-flight
//! state. The only shared mutable state is the content-addressed stage
//! cache.
//!
//! Stage flow, each layer keyed by a hash of its upstream input:
//!
//! file -> ParsingArbiter -> StructureChunker -> ChunkAnalysisOrchestrator
//!      -> ResultIntegrator -> IntegratedAnalysisResult

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::analysis::{AnalysisEvent, ChunkAnalysisOrchestrator};
use crate::cache::{cache_key, CacheStore};
use crate::chunker::{ChunkPlan, ChunkerConfig, StructureChunker};
use crate::integrate::ResultIntegrator;
use crate::models::{
    ArbitratedDocument, ArbitrationSummary, Chunk, ChunkAnalysisResult, IntegratedAnalysisResult,
};
use crate::parsing::{ArbiterError, ParsingArbiter};

/// Bumped whenever the analysis prompt changes shape, so stale cached
/// chunk analyses don't leak across prompt revisions.
const PROMPT_VERSION: &str = "v1";

/// Pipeline-level errors. Only a total parse failure is terminal; the
/// analysis stages degrade to partial results instead of erroring.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ArbiterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress events for one document run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ParseStarted {
        file: String,
    },
    ParseCompleted {
        parser_id: String,
        is_scanned: bool,
        attempts: usize,
        cached: bool,
    },
    ChunkingCompleted {
        chunks: usize,
        oversized: usize,
    },
    Analysis(AnalysisEvent),
    IntegrationCompleted {
        chunks_ok: usize,
        chunks_failed: usize,
    },
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Override the configured token budget.
    pub token_budget: Option<usize>,
    /// Chunk even when the document fits the budget.
    pub force_chunking: bool,
    /// Bypass the arbitration cache.
    pub reparse: bool,
    /// Bypass the per-chunk analysis cache.
    pub reanalyze: bool,
    /// Skip all cache reads and writes.
    pub no_cache: bool,
}

/// Request-scoped context for one document analysis.
pub struct AnalysisRequest {
    /// Correlation id carried through log lines for this run.
    pub request_id: String,
    pub file: PathBuf,
    pub options: PipelineOptions,
    /// Cancellation signal; flips to true at most once.
    pub cancel: Option<watch::Receiver<bool>>,
    pub events: Option<mpsc::Sender<PipelineEvent>>,
}

impl AnalysisRequest {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            file: file.into(),
            options: PipelineOptions::default(),
            cancel: None,
            events: None,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Serialized form of the arbitration stage's cache entry.
#[derive(Serialize, Deserialize)]
struct CachedArbitration {
    document: ArbitratedDocument,
    summary: ArbitrationSummary,
}

/// Assembled pipeline.
pub struct AnalysisPipeline {
    arbiter: ParsingArbiter,
    chunker: StructureChunker,
    orchestrator: ChunkAnalysisOrchestrator,
    integrator: ResultIntegrator,
    cache: Arc<dyn CacheStore>,
    chunker_config: ChunkerConfig,
    /// Model identifier folded into per-chunk cache keys, so switching
    /// models invalidates analyses without touching parse caches.
    model_tag: String,
}

impl AnalysisPipeline {
    pub fn new(
        arbiter: ParsingArbiter,
        orchestrator: ChunkAnalysisOrchestrator,
        cache: Arc<dyn CacheStore>,
        chunker_config: ChunkerConfig,
        model_tag: String,
    ) -> Self {
        Self {
            arbiter,
            chunker: StructureChunker::new(chunker_config.estimator),
            orchestrator,
            integrator: ResultIntegrator::new(),
            cache,
            chunker_config,
            model_tag,
        }
    }

    /// Run the full pipeline for one document.
    ///
    /// Best-effort by design: the caller receives an
    /// `IntegratedAnalysisResult` with explicit coverage stats even
    /// under partial chunk failure. Only a total parse failure
    /// surfaces as an error.
    pub async fn run(&self, request: AnalysisRequest) -> Result<IntegratedAnalysisResult, PipelineError> {
        tracing::info!(
            "Analyzing {} (request {})",
            request.file.display(),
            request.request_id
        );
        let (document, _summary) = self.arbitrate_stage(&request).await?;
        let plan = self.chunk_stage(&request, &document).await;
        let results = self.analysis_stage(&request, &plan).await;
        Ok(self.integrate_stage(&request, &plan, &results).await)
    }

    /// Arbitration only, for `doclens parse` and reuse by `run`.
    pub async fn arbitrate_stage(
        &self,
        request: &AnalysisRequest,
    ) -> Result<(ArbitratedDocument, ArbitrationSummary), PipelineError> {
        emit(
            &request.events,
            PipelineEvent::ParseStarted {
                file: request.file.display().to_string(),
            },
        )
        .await;

        let content = tokio::fs::read(&request.file).await?;
        let file_hash = ArbitratedDocument::compute_hash(&content);
        drop(content);
        let key = cache_key("arbitration", &[file_hash.as_bytes()]);

        if !request.options.reparse && !request.options.no_cache {
            if let Some(cached) = self.cache_get::<CachedArbitration>(&key).await {
                debug!("Arbitration cache hit for {}", request.file.display());
                emit(
                    &request.events,
                    PipelineEvent::ParseCompleted {
                        parser_id: cached.document.chosen_parser_id.clone(),
                        is_scanned: cached.document.is_scanned,
                        attempts: cached.summary.attempts.len(),
                        cached: true,
                    },
                )
                .await;
                return Ok((cached.document, cached.summary));
            }
        }

        let (document, summary) = self.arbiter.arbitrate(&request.file).await?;

        if !request.options.no_cache {
            self.cache_put(
                &key,
                &CachedArbitration {
                    document: document.clone(),
                    summary: summary.clone(),
                },
            )
            .await;
        }

        emit(
            &request.events,
            PipelineEvent::ParseCompleted {
                parser_id: document.chosen_parser_id.clone(),
                is_scanned: document.is_scanned,
                attempts: summary.attempts.len(),
                cached: false,
            },
        )
        .await;

        Ok((document, summary))
    }

    /// Chunking, cached by a hash of the arbitrated text, hints, and
    /// chunker parameters.
    pub async fn chunk_stage(
        &self,
        request: &AnalysisRequest,
        document: &ArbitratedDocument,
    ) -> ChunkPlan {
        let budget = request
            .options
            .token_budget
            .unwrap_or(self.chunker_config.token_budget);
        let hints_json = serde_json::to_vec(&document.hints).unwrap_or_default();
        let params = format!(
            "{}:{}:{}:{}",
            budget,
            request.options.force_chunking,
            self.chunker_config.estimator.chars_per_token,
            self.chunker_config.estimator.cjk_chars_per_token
        );
        let key = cache_key(
            "chunks",
            &[
                document.text.as_bytes(),
                &hints_json,
                params.as_bytes(),
            ],
        );

        let plan = if !request.options.no_cache {
            match self.cache_get::<ChunkPlan>(&key).await {
                Some(plan) => plan,
                None => {
                    let plan = self.chunker.chunk(document, budget, request.options.force_chunking);
                    self.cache_put(&key, &plan).await;
                    plan
                }
            }
        } else {
            self.chunker.chunk(document, budget, request.options.force_chunking)
        };

        emit(
            &request.events,
            PipelineEvent::ChunkingCompleted {
                chunks: plan.chunks.len(),
                oversized: plan.chunks.iter().filter(|c| c.oversized).count(),
            },
        )
        .await;

        plan
    }

    /// Per-chunk analysis. Cached ok results are reused; only misses
    /// go to the orchestrator, and fresh ok results are written back.
    async fn analysis_stage(
        &self,
        request: &AnalysisRequest,
        plan: &ChunkPlan,
    ) -> Vec<ChunkAnalysisResult> {
        let mut cached_results: Vec<ChunkAnalysisResult> = Vec::new();
        let mut pending: Vec<Chunk> = Vec::new();

        for chunk in &plan.chunks {
            if request.options.reanalyze || request.options.no_cache {
                pending.push(chunk.clone());
                continue;
            }
            match self.cache_get::<ChunkAnalysisResult>(&self.chunk_key(chunk)).await {
                Some(mut result) => {
                    // Cached entries keep their original index; align
                    // it with the current plan in case boundaries
                    // shifted but text stayed identical.
                    result.chunk_index = chunk.index;
                    cached_results.push(result);
                }
                None => pending.push(chunk.clone()),
            }
        }

        let fresh = if pending.is_empty() {
            Vec::new()
        } else {
            // Bridge orchestrator events into pipeline events.
            let analysis_tx = request.events.as_ref().map(|events| {
                let events = events.clone();
                let (tx, mut rx) = mpsc::channel::<AnalysisEvent>(64);
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        let _ = events.send(PipelineEvent::Analysis(event)).await;
                    }
                });
                tx
            });

            self.orchestrator
                .analyze(&pending, &plan.tree, request.cancel.clone(), analysis_tx)
                .await
        };

        if !request.options.no_cache {
            for result in fresh.iter().filter(|r| r.is_ok()) {
                if let Some(chunk) = plan.chunks.iter().find(|c| c.index == result.chunk_index) {
                    self.cache_put(&self.chunk_key(chunk), result).await;
                }
            }
        }

        let mut results = cached_results;
        results.extend(fresh);
        results.sort_by_key(|r| r.chunk_index);
        results
    }

    async fn integrate_stage(
        &self,
        request: &AnalysisRequest,
        plan: &ChunkPlan,
        results: &[ChunkAnalysisResult],
    ) -> IntegratedAnalysisResult {
        let results_json = serde_json::to_vec(results).unwrap_or_default();
        let key = cache_key("integrated", &[&results_json]);

        let integrated = if !request.options.no_cache {
            match self.cache_get::<IntegratedAnalysisResult>(&key).await {
                Some(cached) => cached,
                None => {
                    let fresh = self.integrator.integrate(results, plan);
                    self.cache_put(&key, &fresh).await;
                    fresh
                }
            }
        } else {
            self.integrator.integrate(results, plan)
        };

        emit(
            &request.events,
            PipelineEvent::IntegrationCompleted {
                chunks_ok: integrated.coverage.chunks_ok,
                chunks_failed: integrated.coverage.chunks_failed,
            },
        )
        .await;

        integrated
    }

    /// Cache key for one chunk's analysis: chunk text, prompt version,
    /// model, and the oversized flag (which switches the prompt).
    fn chunk_key(&self, chunk: &Chunk) -> String {
        let oversized = if chunk.oversized { b"1".as_slice() } else { b"0".as_slice() };
        cache_key(
            "chunk-analysis",
            &[
                chunk.text.as_bytes(),
                PROMPT_VERSION.as_bytes(),
                self.model_tag.as_bytes(),
                oversized,
            ],
        )
    }

    async fn cache_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.cache.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                // Treat undecodable entries as misses; they'll be
                // overwritten by the fresh value.
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(bytes) = serde_json::to_vec(value) else {
            return;
        };
        if let Err(e) = self.cache.put(key, &bytes).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

async fn emit(events: &Option<mpsc::Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
