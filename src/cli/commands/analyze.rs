//! Full-pipeline analyze command.

use std::path::PathBuf;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::analysis::AnalysisEvent;
use crate::config::{Config, Settings};
use crate::pipeline::{AnalysisRequest, PipelineEvent, PipelineOptions};

pub struct AnalyzeArgs {
    pub file: PathBuf,
    pub budget: Option<usize>,
    pub force_chunking: bool,
    pub reparse: bool,
    pub reanalyze: bool,
    pub no_cache: bool,
    pub json: Option<PathBuf>,
}

pub async fn cmd_analyze(settings: &Settings, config: &Config, args: AnalyzeArgs) -> anyhow::Result<()> {
    let pipeline = config.build_pipeline(settings)?;

    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(64);
    let progress = tokio::spawn(render_events(event_rx));

    let request = AnalysisRequest::new(&args.file)
        .with_options(PipelineOptions {
            token_budget: args.budget,
            force_chunking: args.force_chunking,
            reparse: args.reparse,
            reanalyze: args.reanalyze,
            no_cache: args.no_cache,
        })
        .with_events(event_tx);

    let result = pipeline.run(request).await?;
    let _ = progress.await;

    println!();
    println!("{}", style("Document summary").bold());
    println!("{}", "-".repeat(50));
    println!("{}", result.document_summary);

    if !result.keywords.is_empty() {
        println!();
        println!("{}", style("Top keywords").bold());
        for keyword in result.keywords.iter().take(12) {
            println!(
                "  {:<30} {:.2}  (chunks {:?})",
                keyword.term, keyword.score, keyword.source_chunks
            );
        }
    }

    if !result.entities.is_empty() {
        println!();
        println!("{}", style("Entities").bold());
        for entity in result.entities.iter().take(15) {
            println!(
                "  {:<30} {:<14} x{}",
                entity.name, entity.entity_type, entity.mentions
            );
        }
    }

    if !result.section_summaries.is_empty() {
        println!();
        println!("{}", style("Sections").bold());
        for section in &result.section_summaries {
            println!("  {} {}", style("•").cyan(), style(&section.title).bold());
            println!("    {}", section.summary);
        }
    }

    println!();
    let coverage_line = format!(
        "{} chunks analyzed, {} failed",
        result.coverage.chunks_ok, result.coverage.chunks_failed
    );
    if result.coverage.is_complete() {
        println!("  {} {}", style("✓").green(), coverage_line);
    } else {
        println!(
            "  {} {} — result is partial",
            style("!").yellow(),
            coverage_line
        );
    }

    if let Some(json_path) = args.json {
        let json = serde_json::to_string_pretty(&result)?;
        tokio::fs::write(&json_path, json).await?;
        println!(
            "  {} wrote {}",
            style("✓").green(),
            json_path.display()
        );
    }

    Ok(())
}

/// Render pipeline events as styled progress output.
async fn render_events(mut rx: mpsc::Receiver<PipelineEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::ParseStarted { file } => {
                println!("  {} Parsing: {}", style("→").cyan(), file);
            }
            PipelineEvent::ParseCompleted {
                parser_id,
                is_scanned,
                attempts,
                cached,
            } => {
                let source = if cached { " (cached)" } else { "" };
                let scanned = if is_scanned { ", scanned → OCR" } else { "" };
                println!(
                    "  {} Parsed via {} ({} attempts{}){}",
                    style("✓").green(),
                    parser_id,
                    attempts,
                    scanned,
                    source
                );
            }
            PipelineEvent::ChunkingCompleted { chunks, oversized } => {
                if oversized > 0 {
                    println!(
                        "  {} {} chunks ({} oversized)",
                        style("✓").green(),
                        chunks,
                        oversized
                    );
                } else {
                    println!("  {} {} chunks", style("✓").green(), chunks);
                }
            }
            PipelineEvent::Analysis(analysis_event) => match analysis_event {
                AnalysisEvent::ChunkStarted { total, .. } => {
                    if bar.is_none() {
                        let pb = ProgressBar::new(total as u64);
                        pb.set_style(
                            ProgressStyle::with_template(
                                "  {spinner} analyzing [{bar:30}] {pos}/{len}",
                            )
                            .unwrap_or_else(|_| ProgressStyle::default_bar()),
                        );
                        bar = Some(pb);
                    }
                }
                AnalysisEvent::ChunkCompleted { .. } => {
                    if let Some(pb) = &bar {
                        pb.inc(1);
                    }
                }
                AnalysisEvent::ChunkFailed { chunk_index, error, .. } => {
                    if let Some(pb) = &bar {
                        pb.inc(1);
                        pb.println(format!(
                            "  {} chunk {} failed: {}",
                            style("✗").red(),
                            chunk_index,
                            error
                        ));
                    }
                }
                AnalysisEvent::ChunkRetrying {
                    chunk_index,
                    attempt,
                    ..
                } => {
                    if let Some(pb) = &bar {
                        pb.set_message(format!("retrying chunk {} (attempt {})", chunk_index, attempt));
                    }
                }
            },
            PipelineEvent::IntegrationCompleted { .. } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
    }
}
