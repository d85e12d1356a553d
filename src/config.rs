//! Configuration management.
//!
//! Config files are discovered next to the working directory or under
//! the user config dir and parsed by extension (TOML, YAML, JSON).
//! Sub-configs apply environment overrides in their own `Default`
//! implementations, so a bare `Config::default()` already reflects the
//! environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::{ChunkAnalysisOrchestrator, OllamaProvider, OrchestratorConfig, ProviderConfig};
use crate::cache::FsCache;
use crate::chunker::ChunkerConfig;
use crate::ocr::{OcrManager, OcrSettings};
use crate::parsing::{ParserRegistry, ParsingArbiter, DEFAULT_PARSE_WORKERS};
use crate::pipeline::AnalysisPipeline;

/// Cache subdirectory name under the data dir.
const CACHE_SUBDIR: &str = "cache";

/// Application settings resolved from config and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Directory for the content-addressed stage cache.
    pub cache_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/.local/share/doclens (or the platform
        // equivalent), falling back to the current directory.
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("doclens");

        Self {
            cache_dir: data_dir.join(CACHE_SUBDIR),
            data_dir,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            cache_dir: data_dir.join(CACHE_SUBDIR),
            data_dir,
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Inference provider configuration.
    #[serde(default, skip_serializing_if = "ProviderConfig::is_default")]
    pub provider: ProviderConfig,
    /// OCR engine selection and fallback.
    #[serde(default, skip_serializing_if = "OcrSettings::is_default")]
    pub ocr: OcrSettings,
    /// Chunker budget and token calibration.
    #[serde(default, skip_serializing_if = "ChunkerConfig::is_default")]
    pub chunker: ChunkerConfig,
    /// Analysis scheduling (workers, retries, backoff).
    #[serde(default, skip_serializing_if = "OrchestratorConfig::is_default")]
    pub analysis: OrchestratorConfig,
    /// Pool size for running parser adapters per file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_workers: Option<usize>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from auto-discovered locations.
    pub async fn load() -> Self {
        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                match Self::load_from_path(&candidate).await {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Ignoring config {}: {}", candidate.display(), e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Config file locations checked in order: working directory
    /// first, then the user config dir.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for ext in ["toml", "yaml", "yml", "json"] {
            paths.push(PathBuf::from(format!("doclens.{}", ext)));
        }
        if let Some(config_dir) = dirs::config_dir() {
            for ext in ["toml", "yaml", "yml", "json"] {
                paths.push(config_dir.join("doclens").join(format!("config.{}", ext)));
            }
        }
        paths
    }

    /// Load configuration from a specific file path. Format follows
    /// the file extension: TOML, YAML, or JSON (the default).
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => {
                toml::from_str(&contents).map_err(|e| format!("Failed to parse TOML config: {}", e))?
            }
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings. `base_dir` resolves relative
    /// paths (config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.cache_dir = settings.data_dir.join(CACHE_SUBDIR);
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Assemble the analysis pipeline described by this config.
    pub fn build_pipeline(&self, settings: &Settings) -> anyhow::Result<AnalysisPipeline> {
        settings.ensure_directories()?;

        let ocr = OcrManager::from_settings(&self.ocr)
            .map_err(|e| anyhow::anyhow!("OCR configuration error: {}", e))?;
        let arbiter = ParsingArbiter::new(ParserRegistry::with_defaults(), Arc::new(ocr))
            .with_workers(self.parse_workers.unwrap_or(DEFAULT_PARSE_WORKERS));

        let provider = OllamaProvider::new(self.provider.clone())
            .map_err(|e| anyhow::anyhow!("Provider configuration error: {}", e))?;

        // Response size and temperature live with the provider config;
        // the orchestrator carries the effective copies.
        let mut orchestrator_config = self.analysis.clone();
        orchestrator_config.max_tokens = self.provider.max_tokens;
        orchestrator_config.temperature = self.provider.temperature;
        let orchestrator =
            ChunkAnalysisOrchestrator::new(Arc::new(provider), orchestrator_config);

        let cache = Arc::new(FsCache::new(&settings.cache_dir));

        Ok(AnalysisPipeline::new(
            arbiter,
            orchestrator,
            cache,
            self.chunker.clone(),
            self.provider.model.clone(),
        ))
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data flag).
    pub data: Option<PathBuf>,
}

/// Load settings with explicit options. Returns (Settings, Config).
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("Falling back to defaults: {}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence.
    if let Some(data_dir) = options.data {
        settings = Settings::with_data_dir(data_dir);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doclens.toml");
        tokio::fs::write(
            &path,
            r#"
data_dir = "./analysis-data"

[provider]
model = "llama3.1:8b"

[chunker]
token_budget = 1500

[analysis]
workers = 2
"#,
        )
        .await
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.provider.model, "llama3.1:8b");
        assert_eq!(config.chunker.token_budget, 1500);
        assert_eq!(config.analysis.workers, 2);
        assert_eq!(config.data_dir.as_deref(), Some("./analysis-data"));
    }

    #[tokio::test]
    async fn test_data_dir_resolved_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doclens.json");
        tokio::fs::write(&path, r#"{"data_dir": "./store"}"#).await.unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.data_dir, dir.path().join("./store"));
        assert!(settings.cache_dir.ends_with("cache"));
    }

    #[test]
    fn test_config_hash_stable() {
        let config = Config::default();
        assert_eq!(config.hash(), config.hash());
    }
}
