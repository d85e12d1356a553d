//! Arbitration-only parse command.

use std::path::Path;

use console::style;

use crate::config::{Config, Settings};
use crate::pipeline::{AnalysisRequest, PipelineOptions};

pub async fn cmd_parse(
    settings: &Settings,
    config: &Config,
    file: &Path,
    reparse: bool,
) -> anyhow::Result<()> {
    let pipeline = config.build_pipeline(settings)?;

    let request = AnalysisRequest::new(file).with_options(PipelineOptions {
        reparse,
        ..Default::default()
    });

    let (document, summary) = pipeline.arbitrate_stage(&request).await?;

    println!("\n{}", style("Parse attempts").bold());
    println!("{}", "-".repeat(60));
    for attempt in &summary.attempts {
        let status = if attempt.succeeded {
            style("ok").green()
        } else {
            style("failed").red()
        };
        let marker = if attempt.parser_id == summary.chosen_parser_id {
            style("*").cyan().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {:<12} score {:.3}  {:>8} chars  {}",
            marker,
            attempt.parser_id,
            attempt.quality_score,
            attempt.text_len,
            status
        );
        if let Some(error) = &attempt.error {
            println!("    {}", style(error).dim());
        }
    }

    println!();
    println!("chosen:  {}", style(&summary.chosen_parser_id).bold());
    println!("scanned: {}", document.is_scanned);
    if let Some(score) = document.runner_up_score {
        println!("best non-OCR score: {:.3}", score);
    }
    if let Some(pages) = document.hints.page_count {
        println!("pages:   {}", pages);
    }
    println!(
        "text:    {} chars, {} headings",
        document.text.len(),
        document.hints.headings.len()
    );

    Ok(())
}
