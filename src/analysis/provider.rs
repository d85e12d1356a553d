//! External analysis provider seam.
//!
//! The provider is a remote call that can fail transiently; only its
//! success/failure/timeout contract matters to the orchestrator. The
//! concrete protocol here is the Ollama generate API, single-shot,
//! streaming disabled.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from one provider call, split by retry class.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Call exceeded the configured timeout.
    #[error("provider call timed out")]
    Timeout,

    /// Provider asked us to back off.
    #[error("provider rate limited the request")]
    RateLimited,

    /// Could not reach the provider.
    #[error("connection error: {0}")]
    Connection(String),

    /// Response arrived but was not syntactically complete.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Provider-side failure (HTTP 5xx).
    #[error("provider error: {0}")]
    Server(String),

    /// Credentials rejected. Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request itself is invalid. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether the failure class is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::RateLimited
                | Self::Connection(_)
                | Self::Malformed(_)
                | Self::Server(_)
        )
    }
}

/// Single-shot text completion against an external provider.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

/// Configuration for the inference provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to use for analysis.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in the response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl ProviderConfig {
    /// Base default without env overrides (used internally to avoid
    /// recursion).
    fn base_default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Check if the config equals the default (for
    /// skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENDPOINT`: API endpoint
    /// - `LLM_MODEL`: model name
    /// - `LLM_MAX_TOKENS`: maximum tokens in response
    /// - `LLM_TEMPERATURE`: generation temperature (0.0-1.0)
    /// - `LLM_TIMEOUT_SECS`: per-call timeout
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENDPOINT") {
            self.endpoint = val;
        }
        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = val.parse() {
                self.max_tokens = n;
            }
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(t) = val.parse() {
                self.temperature = t;
            }
        }
        if let Ok(val) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

/// Ollama-backed provider.
pub struct OllamaProvider {
    config: ProviderConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Check if the provider is reachable.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::Auth(format!("HTTP {}: {}", status, body)),
            429 => ProviderError::RateLimited,
            400 | 404 | 422 => ProviderError::InvalidRequest(format!("HTTP {}: {}", status, body)),
            s if s >= 500 => ProviderError::Server(format!("HTTP {}: {}", status, body)),
            _ => ProviderError::Server(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl AnalysisProvider for OllamaProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!("Provider call: {} ({} prompt bytes)", url, prompt.len());

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Connection(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let ollama_resp: OllamaResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Malformed(e.to_string())
            }
        })?;

        Ok(ollama_resp.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Malformed("x".into()).is_transient());
        assert!(ProviderError::Server("x".into()).is_transient());
        assert!(!ProviderError::Auth("x".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("x".into()).is_transient());
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::BAD_REQUEST, String::new()),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            OllamaProvider::classify_status(StatusCode::BAD_GATEWAY, String::new()),
            ProviderError::Server(_)
        ));
    }

    #[test]
    fn test_env_override_names_exist() {
        // Defaults parse without env interference.
        let config = ProviderConfig::base_default();
        assert!(config.endpoint.starts_with("http"));
        assert!(config.max_tokens > 0);
    }
}
