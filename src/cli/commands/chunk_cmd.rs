//! Chunking-only command.

use std::path::Path;

use console::style;

use crate::config::{Config, Settings};
use crate::pipeline::{AnalysisRequest, PipelineOptions};

pub async fn cmd_chunk(
    settings: &Settings,
    config: &Config,
    file: &Path,
    budget: Option<usize>,
    force_chunking: bool,
) -> anyhow::Result<()> {
    let pipeline = config.build_pipeline(settings)?;

    let request = AnalysisRequest::new(file).with_options(PipelineOptions {
        token_budget: budget,
        force_chunking,
        ..Default::default()
    });

    let (document, _) = pipeline.arbitrate_stage(&request).await?;
    let plan = pipeline.chunk_stage(&request, &document).await;

    println!("\n{}", style("Chunks").bold());
    println!("{}", "-".repeat(60));
    for chunk in &plan.chunks {
        let flag = if chunk.oversized {
            style(" OVERSIZED").yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{:>3}  [{:>8}..{:<8}]  ~{} tokens, {} nodes{}",
            chunk.index,
            chunk.start,
            chunk.end,
            chunk.estimated_tokens,
            chunk.node_ids.len(),
            flag
        );
    }

    println!();
    println!(
        "{} nodes in tree, {} chunks",
        plan.tree.len(),
        plan.chunks.len()
    );

    Ok(())
}
