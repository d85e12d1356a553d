//! PDF parser adapters backed by the Poppler command-line tools.
//!
//! Two adapters share the same plumbing: `pdf-layout` preserves the
//! page layout (`pdftotext -layout`) and wins ties, `pdf-raw` is the
//! generic extractor (`pdftotext -raw`). Structural hints come from
//! `pdfinfo` (page count) and `pdfimages -list` (embedded image count).

use std::path::Path;
use std::process::Command;

use super::adapter::{detect_text_headings, ParseError, ParserAdapter, ParserOutput};
use crate::models::StructuralHints;

/// Handle command output, extracting stdout on success or returning the
/// appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ParseError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ParseError::ExtractionFailed(format!(
                    "{}: {}",
                    error_prefix, stderr
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ParseError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ParseError::Io(e)),
    }
}

/// Run pdftotext with the given mode flag and collect stdout.
fn run_pdftotext(file_path: &Path, mode_flag: &str) -> Result<String, ParseError> {
    let output = Command::new("pdftotext")
        .args([mode_flag, "-enc", "UTF-8"])
        .arg(file_path)
        .arg("-") // stdout
        .output();

    handle_cmd_output(output, "pdftotext (install poppler-utils)", "pdftotext failed")
}

/// Get the page count of a PDF via pdfinfo.
pub fn pdf_page_count(file_path: &Path) -> Option<u32> {
    let output = Command::new("pdfinfo").arg(file_path).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if line.starts_with("Pages:") {
            return line.split_whitespace().nth(1).and_then(|s| s.parse().ok());
        }
    }
    None
}

/// Count embedded images via `pdfimages -list`. The listing has a
/// two-line header; every following line is one image.
fn pdf_image_count(file_path: &Path) -> usize {
    let output = Command::new("pdfimages")
        .arg("-list")
        .arg(file_path)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            stdout.lines().skip(2).filter(|l| !l.trim().is_empty()).count()
        }
        _ => 0,
    }
}

/// Gather shared PDF hints and run the heading heuristic over the
/// extracted text.
fn pdf_hints(file_path: &Path, text: &str) -> StructuralHints {
    StructuralHints {
        headings: detect_text_headings(text),
        table_count: 0, // pdftotext does not surface table structure
        image_count: pdf_image_count(file_path),
        page_count: pdf_page_count(file_path),
    }
}

/// Layout-preserving PDF extractor. Preferred on ties for PDFs.
pub struct PdfLayoutAdapter;

impl PdfLayoutAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfLayoutAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for PdfLayoutAdapter {
    fn id(&self) -> &'static str {
        "pdf-layout"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "application/pdf"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let text = run_pdftotext(path, "-layout")?;
        let hints = pdf_hints(path, &text);
        Ok(ParserOutput { text, hints })
    }
}

/// Generic reading-order PDF extractor.
pub struct PdfRawAdapter;

impl PdfRawAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfRawAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for PdfRawAdapter {
    fn id(&self) -> &'static str {
        "pdf-raw"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "application/pdf"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let text = run_pdftotext(path, "-raw")?;
        let hints = pdf_hints(path, &text);
        Ok(ParserOutput { text, hints })
    }
}
