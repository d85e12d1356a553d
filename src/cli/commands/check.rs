//! Tool and engine availability check.

use console::style;

use crate::analysis::OllamaProvider;
use crate::config::Config;
use crate::ocr::{check_binary, OcrEngine, TesseractEngine};

pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("External tools").bold());
    println!("{}", "-".repeat(50));

    for tool in ["pdftotext", "pdfinfo", "pdfimages", "pdftoppm", "tesseract"] {
        let status = if check_binary(tool) {
            style("✓ found").green()
        } else {
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }

    println!("\n{}", style("OCR engines").bold());

    let tesseract = TesseractEngine::new();
    let status = if tesseract.is_available() {
        style("✓ available").green()
    } else {
        style("✗ not available").red()
    };
    println!("  {:<15} {}", "tesseract", status);
    if !tesseract.is_available() {
        println!("                  {}", style(tesseract.availability_hint()).dim());
    }

    #[cfg(feature = "ocr-ocrs")]
    {
        use crate::ocr::OcrsEngine;
        let ocrs = OcrsEngine::new();
        let status = if ocrs.is_available() {
            style("✓ available").green()
        } else {
            style("○ needs pdftoppm").yellow()
        };
        println!("  {:<15} {}", "ocrs", status);
        println!("                  {}", style(ocrs.availability_hint()).dim());
    }
    #[cfg(not(feature = "ocr-ocrs"))]
    {
        println!(
            "  {:<15} {}",
            "ocrs",
            style("not compiled (enable ocr-ocrs feature)").dim()
        );
    }

    println!("\n{}", style("Analysis provider").bold());
    match OllamaProvider::new(config.provider.clone()) {
        Ok(provider) => {
            let status = if provider.is_available().await {
                style("✓ reachable").green()
            } else {
                style("✗ unreachable").red()
            };
            println!("  {:<15} {}", config.provider.endpoint, status);
            println!("  model: {}", config.provider.model);
        }
        Err(e) => {
            println!("  {} {}", style("✗").red(), e);
        }
    }

    Ok(())
}
