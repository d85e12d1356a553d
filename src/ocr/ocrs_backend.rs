//! OCRS OCR engine.
//!
//! Pure-Rust deep-learning OCR via the ocrs crate, no external
//! binaries for recognition (pdftoppm still renders the page images).
//! Models are automatically downloaded on first use from:
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use tempfile::TempDir;

use super::model_utils::{ensure_model_file, ModelDirConfig, ModelSpec};
use super::{OcrEngine, OcrError, OcrPageResult};

/// Global cached engine instance (initialized once, reused for all
/// OCR calls). OcrEngine is Send+Sync and its methods take &self, so
/// no Mutex needed.
static OCR_ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

/// Model directory configuration for OCRS.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "ocrs",
    required_files: &["text-detection.rten", "text-recognition.rten"],
};

const DETECTION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
    filename: "text-detection.rten",
    size_hint: "2.5 MB",
};

const RECOGNITION_MODEL: ModelSpec = ModelSpec {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
    filename: "text-recognition.rten",
    size_hint: "10 MB",
};

pub struct OcrsEngine;

impl OcrsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Find the model directory among the standard locations.
    fn find_model_dir(&self) -> Option<PathBuf> {
        MODEL_CONFIG
            .candidate_dirs()
            .into_iter()
            .find(|dir| MODEL_CONFIG.has_required_files(dir))
    }

    /// Ensure models are present, downloading them if necessary.
    fn ensure_models(&self) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.find_model_dir() {
            return Ok(dir);
        }

        let model_dir = MODEL_CONFIG.default_dir();
        std::fs::create_dir_all(&model_dir).map_err(OcrError::Io)?;

        ensure_model_file(&DETECTION_MODEL, &model_dir)?;
        ensure_model_file(&RECOGNITION_MODEL, &model_dir)?;

        Ok(model_dir)
    }

    /// Get or initialize the cached engine.
    fn get_or_init_engine(&self) -> Result<&'static ocrs::OcrEngine, OcrError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let model_dir = self.ensure_models()?;
        let detection_path = model_dir.join("text-detection.rten");
        let recognition_path = model_dir.join("text-recognition.rten");

        let detection_model = rten::Model::load_file(&detection_path)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to load detection model: {}", e)))?;
        let recognition_model = rten::Model::load_file(&recognition_path)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to load recognition model: {}", e)))?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("Failed to create OCR engine: {}", e)))?;

        // If another thread beat us to it, that's fine.
        let _ = OCR_ENGINE.set(engine);

        OCR_ENGINE
            .get()
            .ok_or_else(|| OcrError::OcrFailed("Failed to cache OCR engine".to_string()))
    }

    /// Run OCR on an image file.
    fn run_ocrs(&self, image_path: &Path) -> Result<String, OcrError> {
        let engine = self.get_or_init_engine()?;

        let img = image::open(image_path)
            .map_err(|e| OcrError::ImageError(format!("Failed to load image: {}", e)))?;
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let img_source = ocrs::ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| OcrError::ImageError(format!("Failed to convert image: {}", e)))?;

        let input = engine
            .prepare_input(img_source)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to prepare input: {}", e)))?;

        let text = engine
            .get_text(&input)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to extract text: {}", e)))?;

        Ok(text)
    }

    /// Convert one PDF page to a PNG in `output_dir`.
    fn pdf_page_to_image(
        &self,
        pdf_path: &Path,
        page: u32,
        output_dir: &Path,
    ) -> Result<PathBuf, OcrError> {
        let page_str = page.to_string();
        let output_prefix = output_dir.join("page");

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
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

impl Default for OcrsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn find_page_image(temp_path: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn is_available(&self) -> bool {
        // Models auto-download on first use; only pdftoppm is a hard
        // prerequisite.
        super::check_binary("pdftoppm")
    }

    fn availability_hint(&self) -> String {
        match self.find_model_dir() {
            Some(path) => format!("OCRS models found at {:?}", path),
            None => format!(
                "OCRS models will be auto-downloaded on first use (~12 MB total) to {:?}",
                MODEL_CONFIG.default_dir()
            ),
        }
    }

    fn recognize_pdf_page(
        &self,
        pdf_path: &Path,
        page: u32,
        _languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        let temp_dir = TempDir::new()?;
        let image_path = self.pdf_page_to_image(pdf_path, page, temp_dir.path())?;
        let text = self.run_ocrs(&image_path)?;

        Ok(OcrPageResult {
            text,
            confidence: None,
        })
    }

    fn recognize_image(
        &self,
        image_path: &Path,
        _languages: &str,
    ) -> Result<OcrPageResult, OcrError> {
        let text = self.run_ocrs(image_path)?;
        Ok(OcrPageResult {
            text,
            confidence: None,
        })
    }
}
