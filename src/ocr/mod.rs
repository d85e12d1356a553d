//! OCR engines for scanned documents.
//!
//! When the scan detector fires, the whole document is rendered to
//! page images and recognized page by page. Two engine families exist:
//!
//! - **Tesseract**: traditional OCR via the system binary (default)
//! - **OCRS**: pure-Rust deep-learning OCR (feature: ocr-ocrs, models
//!   auto-download)
//!
//! `OcrManager` applies the selection policy: try the primary engine,
//! fall back to the secondary on initialization failure or per-page
//! failure / low confidence.

mod model_utils;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;

pub use model_utils::check_binary;
pub use tesseract::TesseractEngine;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsEngine;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("image error: {0}")]
    ImageError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text recognized from one page image.
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean recognition confidence in [0, 1] when the engine reports
    /// one.
    pub confidence: Option<f32>,
}

/// One OCR engine.
pub trait OcrEngine: Send + Sync {
    /// Engine name as used in configuration and attempt records.
    fn name(&self) -> &'static str;

    /// Whether the engine can run at all (binary present, models
    /// loadable). Checked once before the per-page loop.
    fn is_available(&self) -> bool;

    /// Human-readable install/download hint for `doclens check`.
    fn availability_hint(&self) -> String;

    /// Recognize one page of a PDF.
    fn recognize_pdf_page(&self, pdf_path: &Path, page: u32, languages: &str)
        -> Result<OcrPageResult, OcrError>;

    /// Recognize a standalone image file.
    fn recognize_image(&self, image_path: &Path, languages: &str)
        -> Result<OcrPageResult, OcrError>;
}

/// Full-document OCR output.
#[derive(Debug, Clone)]
pub struct OcrDocumentResult {
    /// Page texts joined in order with blank lines.
    pub text: String,
    /// Name of the engine that produced the majority of pages.
    pub engine: String,
    pub pages_ok: usize,
    pub pages_failed: usize,
}

/// Configuration for the OCR path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Primary engine name ("tesseract" or "ocrs").
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Secondary engine name, tried on primary failure.
    #[serde(default)]
    pub secondary: Option<String>,
    /// Languages passed to the engine (tesseract syntax, e.g.
    /// "eng+kor").
    #[serde(default = "default_languages")]
    pub languages: String,
    /// Pages whose reported confidence falls below this are retried on
    /// the secondary engine.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_primary() -> String {
    "tesseract".to_string()
}

fn default_languages() -> String {
    "eng".to_string()
}

fn default_min_confidence() -> f32 {
    0.35
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: None,
            languages: default_languages(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl OcrSettings {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Builds an engine by configured name. Unknown names and engines
/// compiled out come back as errors, not panics.
fn build_engine(name: &str) -> Result<Box<dyn OcrEngine>, OcrError> {
    match name {
        "tesseract" => Ok(Box::new(TesseractEngine::new())),
        #[cfg(feature = "ocr-ocrs")]
        "ocrs" => Ok(Box::new(OcrsEngine::new())),
        #[cfg(not(feature = "ocr-ocrs"))]
        "ocrs" => Err(OcrError::EngineNotAvailable(
            "ocrs engine not compiled in (enable the ocr-ocrs feature)".to_string(),
        )),
        other => Err(OcrError::EngineNotAvailable(format!(
            "unknown OCR engine: {}",
            other
        ))),
    }
}

/// Primary-plus-fallback OCR over whole documents.
pub struct OcrManager {
    primary: Box<dyn OcrEngine>,
    secondary: Option<Box<dyn OcrEngine>>,
    languages: String,
    min_confidence: f32,
}

impl OcrManager {
    /// Build from settings. Fails only when the primary engine name is
    /// unknown; a broken secondary is dropped with a warning.
    pub fn from_settings(settings: &OcrSettings) -> Result<Self, OcrError> {
        let primary = build_engine(&settings.primary)?;
        let secondary = match settings.secondary.as_deref() {
            Some(name) => match build_engine(name) {
                Ok(engine) => Some(engine),
                Err(e) => {
                    tracing::warn!("Secondary OCR engine unavailable: {}", e);
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            primary,
            secondary,
            languages: settings.languages.clone(),
            min_confidence: settings.min_confidence,
        })
    }

    /// Build directly from engines, for tests.
    pub fn from_engines(
        primary: Box<dyn OcrEngine>,
        secondary: Option<Box<dyn OcrEngine>>,
        languages: &str,
        min_confidence: f32,
    ) -> Self {
        Self {
            primary,
            secondary,
            languages: languages.to_string(),
            min_confidence,
        }
    }

    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    /// OCR every page of a document.
    ///
    /// The primary engine is used unless it fails to initialize, in
    /// which case the secondary takes over for the whole document.
    /// Individual page failures and low-confidence pages retry on the
    /// secondary; a page that fails on both engines is recorded as a
    /// failed page, never aborting the document.
    pub fn ocr_document(&self, pdf_path: &Path, page_count: u32) -> Result<OcrDocumentResult, OcrError> {
        let (engine, fallback) = if self.primary.is_available() {
            (self.primary.as_ref(), self.secondary.as_deref())
        } else if let Some(secondary) = self.secondary.as_deref() {
            tracing::warn!(
                "Primary OCR engine {} unavailable, using {}",
                self.primary.name(),
                secondary.name()
            );
            (secondary, None)
        } else {
            return Err(OcrError::EngineNotAvailable(
                self.primary.availability_hint(),
            ));
        };

        let mut page_texts: Vec<String> = Vec::with_capacity(page_count as usize);
        let mut pages_ok = 0usize;
        let mut pages_failed = 0usize;

        for page in 1..=page_count.max(1) {
            match self.ocr_page(engine, fallback, pdf_path, page) {
                Some(text) => {
                    pages_ok += 1;
                    page_texts.push(text);
                }
                None => {
                    pages_failed += 1;
                    page_texts.push(String::new());
                }
            }
        }

        if pages_ok == 0 {
            return Err(OcrError::OcrFailed(format!(
                "all {} pages failed OCR",
                page_count
            )));
        }

        Ok(OcrDocumentResult {
            text: page_texts.join("\n\n"),
            engine: engine.name().to_string(),
            pages_ok,
            pages_failed,
        })
    }

    fn ocr_page(
        &self,
        engine: &dyn OcrEngine,
        fallback: Option<&dyn OcrEngine>,
        pdf_path: &Path,
        page: u32,
    ) -> Option<String> {
        match engine.recognize_pdf_page(pdf_path, page, &self.languages) {
            Ok(result) => {
                let low_confidence = result
                    .confidence
                    .is_some_and(|c| c < self.min_confidence);
                if low_confidence {
                    if let Some(fb) = fallback {
                        tracing::debug!(
                            "Page {} confidence below {}, retrying on {}",
                            page,
                            self.min_confidence,
                            fb.name()
                        );
                        if let Ok(retry) = fb.recognize_pdf_page(pdf_path, page, &self.languages) {
                            return Some(retry.text);
                        }
                    }
                }
                Some(result.text)
            }
            Err(e) => {
                tracing::debug!("OCR failed for page {} on {}: {}", page, engine.name(), e);
                let fb = fallback?;
                match fb.recognize_pdf_page(pdf_path, page, &self.languages) {
                    Ok(result) => Some(result.text),
                    Err(e2) => {
                        tracing::warn!("OCR failed for page {} on both engines: {}", page, e2);
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubEngine {
        name: &'static str,
        available: bool,
        fail_pages: Vec<u32>,
        confidence: Option<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl StubEngine {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                available: true,
                fail_pages: Vec::new(),
                confidence: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl OcrEngine for StubEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn availability_hint(&self) -> String {
            "stub".to_string()
        }

        fn recognize_pdf_page(
            &self,
            _pdf: &Path,
            page: u32,
            _languages: &str,
        ) -> Result<OcrPageResult, OcrError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_pages.contains(&page) {
                return Err(OcrError::OcrFailed(format!("page {}", page)));
            }
            Ok(OcrPageResult {
                text: format!("{} page {}", self.name, page),
                confidence: self.confidence,
            })
        }

        fn recognize_image(
            &self,
            _image: &Path,
            _languages: &str,
        ) -> Result<OcrPageResult, OcrError> {
            Ok(OcrPageResult {
                text: format!("{} image", self.name),
                confidence: self.confidence,
            })
        }
    }

    #[test]
    fn test_all_pages_go_through_primary() {
        let primary = StubEngine::new("primary");
        let calls = primary.calls.clone();
        let manager = OcrManager::from_engines(Box::new(primary), None, "eng", 0.35);
        let result = manager.ocr_document(Path::new("/tmp/x.pdf"), 3).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(result.pages_ok, 3);
        assert!(result.text.contains("primary page 3"));
    }

    #[test]
    fn test_init_failure_switches_to_secondary() {
        let mut primary = StubEngine::new("primary");
        primary.available = false;
        let secondary = StubEngine::new("secondary");
        let manager =
            OcrManager::from_engines(Box::new(primary), Some(Box::new(secondary)), "eng", 0.35);
        let result = manager.ocr_document(Path::new("/tmp/x.pdf"), 2).unwrap();
        assert_eq!(result.engine, "secondary");
    }

    #[test]
    fn test_page_failure_falls_back_per_page() {
        let mut primary = StubEngine::new("primary");
        primary.fail_pages = vec![2];
        let secondary = StubEngine::new("secondary");
        let manager =
            OcrManager::from_engines(Box::new(primary), Some(Box::new(secondary)), "eng", 0.35);
        let result = manager.ocr_document(Path::new("/tmp/x.pdf"), 3).unwrap();
        assert_eq!(result.pages_ok, 3);
        assert!(result.text.contains("secondary page 2"));
        assert!(result.text.contains("primary page 1"));
    }

    #[test]
    fn test_low_confidence_retries_on_secondary() {
        let mut primary = StubEngine::new("primary");
        primary.confidence = Some(0.1);
        let secondary = StubEngine::new("secondary");
        let manager =
            OcrManager::from_engines(Box::new(primary), Some(Box::new(secondary)), "eng", 0.35);
        let result = manager.ocr_document(Path::new("/tmp/x.pdf"), 1).unwrap();
        assert!(result.text.contains("secondary page 1"));
    }

    #[test]
    fn test_no_engine_available_errors() {
        let mut primary = StubEngine::new("primary");
        primary.available = false;
        let manager = OcrManager::from_engines(Box::new(primary), None, "eng", 0.35);
        assert!(manager.ocr_document(Path::new("/tmp/x.pdf"), 1).is_err());
    }
}
