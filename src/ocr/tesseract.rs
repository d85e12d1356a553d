//! Tesseract OCR engine.
//!
//! Uses the Tesseract binary via the command line; pages are rendered
//! with pdftoppm first. Traditional, widely available, CPU-based.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use super::model_utils::check_binary;
use super::{OcrEngine, OcrError, OcrPageResult};

/// Rendering resolution for page images.
const RENDER_DPI: &str = "300";

pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run Tesseract on an image file.
    fn run_tesseract(&self, image_path: &Path, languages: &str) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", languages])
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::EngineNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }

    /// Convert one PDF page to a PNG in `output_dir`.
    fn pdf_page_to_image(
        &self,
        pdf_path: &Path,
        page: u32,
        output_dir: &Path,
    ) -> Result<std::path::PathBuf, OcrError> {
        let page_str = page.to_string();
        let output_prefix = output_dir.join("page");

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", RENDER_DPI, "-f", &page_str, "-l", &page_str])
            .arg(pdf_path)
            .arg(&output_prefix)
            .status();

        match status {
            Ok(s) if s.success() => find_page_image(output_dir, page).ok_or_else(|| {
                OcrError::OcrFailed(format!("No image generated for page {}", page))
            }),
            Ok(_) => Err(OcrError::OcrFailed(
                "pdftoppm failed to convert PDF page".to_string(),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::EngineNotAvailable(
                    "pdftoppm not found (install poppler-utils)".to_string(),
                ))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the image file for a specific page number. pdftoppm names files
/// page-01.png, page-02.png, with more digits for long documents.
fn find_page_image(temp_path: &Path, page_num: u32) -> Option<std::path::PathBuf> {
    for digits in [2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract") && check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else if !check_binary("pdftoppm") {
            "pdftoppm not installed. Install with: apt install poppler-utils".to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    fn recognize_pdf_page(
        &self,
        pdf_path: &Path,
        page: u32,
        languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        let temp_dir = TempDir::new()?;
        let image_path = self.pdf_page_to_image(pdf_path, page, temp_dir.path())?;
        let text = self.run_tesseract(&image_path, languages)?;

        Ok(OcrPageResult {
            text,
            confidence: None, // Tesseract can report this but we don't parse it
        })
    }

    fn recognize_image(
        &self,
        image_path: &Path,
        languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        let text = self.run_tesseract(image_path, languages)?;
        Ok(OcrPageResult {
            text,
            confidence: None,
        })
    }
}
