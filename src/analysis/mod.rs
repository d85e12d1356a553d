//! Chunk analysis orchestration.
//!
//! Schedules one provider call per chunk with bounded concurrency,
//! retry with exponential backoff for transient failures, and strict
//! per-chunk failure isolation: one chunk failing — even fatally —
//! never aborts the batch. Results come back ordered by chunk index
//! regardless of completion order.

mod prompts;
mod provider;
mod response;

pub use prompts::{render, DEFAULT_CHUNK_PROMPT, OVERSIZED_CHUNK_PROMPT};
pub use provider::{AnalysisProvider, OllamaProvider, ProviderConfig, ProviderError};
pub use response::parse_chunk_analysis;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::models::{Chunk, ChunkAnalysisResult, DocumentTree};

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    ChunkStarted {
        chunk_index: usize,
        total: usize,
    },
    ChunkRetrying {
        chunk_index: usize,
        attempt: u32,
        error: String,
    },
    ChunkCompleted {
        chunk_index: usize,
        attempt_count: u32,
    },
    ChunkFailed {
        chunk_index: usize,
        attempt_count: u32,
        error: String,
    },
}

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrent provider calls.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempts per chunk, first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay; doubles per retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff cap.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Maximum tokens requested per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Generation temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    8000
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl OrchestratorConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Backoff before the given retry (1-based attempt that just
    /// failed): base * 2^(attempt-1), capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Schedules chunk analysis calls against the external provider.
pub struct ChunkAnalysisOrchestrator {
    provider: Arc<dyn AnalysisProvider>,
    config: OrchestratorConfig,
}

impl ChunkAnalysisOrchestrator {
    pub fn new(provider: Arc<dyn AnalysisProvider>, config: OrchestratorConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Analyze a batch of chunks.
    ///
    /// The returned vector is ordered by chunk index and has exactly
    /// one entry per input chunk. Cancellation stops new dispatches;
    /// calls already in flight finish or time out naturally and their
    /// results are preserved.
    pub async fn analyze(
        &self,
        chunks: &[Chunk],
        tree: &DocumentTree,
        cancel: Option<watch::Receiver<bool>>,
        event_tx: Option<mpsc::Sender<AnalysisEvent>>,
    ) -> Vec<ChunkAnalysisResult> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();

        for chunk in chunks {
            let prompt = self.build_prompt(chunk, tree);
            let provider = self.provider.clone();
            let config = self.config.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let event_tx = event_tx.clone();
            let index = chunk.index;

            join_set.spawn(async move {
                // Permit acquisition bounds concurrency; an error here
                // only happens when the semaphore is closed, which we
                // never do.
                let _permit = semaphore.acquire().await;

                if is_cancelled(&cancel) {
                    return ChunkAnalysisResult::failed(
                        index,
                        0,
                        "cancelled before dispatch".to_string(),
                    );
                }

                if let Some(tx) = &event_tx {
                    let _ = tx
                        .send(AnalysisEvent::ChunkStarted {
                            chunk_index: index,
                            total,
                        })
                        .await;
                }

                run_chunk(index, &prompt, provider, &config, cancel, event_tx).await
            });
        }

        let mut collected: Vec<ChunkAnalysisResult> = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => collected.push(result),
                Err(e) => {
                    // A panicked task loses its index; the gap is
                    // refilled below so positional correspondence
                    // still holds.
                    warn!("Analysis task panicked: {}", e);
                }
            }
        }

        for chunk in chunks {
            if !collected.iter().any(|r| r.chunk_index == chunk.index) {
                collected.push(ChunkAnalysisResult::failed(
                    chunk.index,
                    0,
                    "analysis task panicked".to_string(),
                ));
            }
        }
        collected.sort_by_key(|r| r.chunk_index);
        collected
    }

    /// Bounded prompt: ancestor titles for context plus the chunk
    /// text. Oversized chunks get the reduced prompt.
    fn build_prompt(&self, chunk: &Chunk, tree: &DocumentTree) -> String {
        let breadcrumb = chunk
            .node_ids
            .first()
            .map(|&id| {
                let mut parts: Vec<String> = tree
                    .ancestor_titles(id)
                    .into_iter()
                    .map(|t| t.to_string())
                    .collect();
                if let Some(node) = tree.get(id) {
                    if !node.title.is_empty() && !node.implicit {
                        parts.push(node.title.clone());
                    }
                }
                parts.join(" > ")
            })
            .unwrap_or_default();

        let template = if chunk.oversized {
            OVERSIZED_CHUNK_PROMPT
        } else {
            DEFAULT_CHUNK_PROMPT
        };
        render(template, &breadcrumb, &chunk.text)
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Drive one chunk through its attempts.
async fn run_chunk(
    index: usize,
    prompt: &str,
    provider: Arc<dyn AnalysisProvider>,
    config: &OrchestratorConfig,
    cancel: Option<watch::Receiver<bool>>,
    event_tx: Option<mpsc::Sender<AnalysisEvent>>,
) -> ChunkAnalysisResult {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = provider
            .complete(prompt, config.max_tokens, config.temperature)
            .await
            .and_then(|raw| parse_chunk_analysis(&raw));

        let error = match outcome {
            Ok(analysis) => {
                if let Some(tx) = &event_tx {
                    let _ = tx
                        .send(AnalysisEvent::ChunkCompleted {
                            chunk_index: index,
                            attempt_count: attempt,
                        })
                        .await;
                }
                return ChunkAnalysisResult::ok(index, analysis, attempt);
            }
            Err(e) => e,
        };

        let retryable = error.is_transient() && attempt < config.max_attempts;
        if !retryable {
            debug!("Chunk {} failed after {} attempts: {}", index, attempt, error);
            if let Some(tx) = &event_tx {
                let _ = tx
                    .send(AnalysisEvent::ChunkFailed {
                        chunk_index: index,
                        attempt_count: attempt,
                        error: error.to_string(),
                    })
                    .await;
            }
            return ChunkAnalysisResult::failed(index, attempt, error.to_string());
        }

        if let Some(tx) = &event_tx {
            let _ = tx
                .send(AnalysisEvent::ChunkRetrying {
                    chunk_index: index,
                    attempt,
                    error: error.to_string(),
                })
                .await;
        }

        // Backoff, but stop retrying the moment cancellation lands;
        // a retry is a new dispatch.
        let delay = config.backoff(attempt);
        if let Some(mut rx) = cancel.clone() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = rx.changed() => {}
            }
            if *rx.borrow() {
                return ChunkAnalysisResult::failed(
                    index,
                    attempt,
                    format!("cancelled during retry ({})", error),
                );
            }
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}
