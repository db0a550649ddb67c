//! Pluggable language-model backends for the intent resolver.
//!
//! A provider does one thing: turn a composed planner prompt into raw text
//! that should contain a single structured operation object. Sanitation,
//! extraction, schema validation and retries all live in the resolver, so
//! backends stay swappable without touching validation logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::extract;
use crate::config::PlannerConfig;
use crate::errors::{GovError, GovResult};

#[async_trait]
pub trait PlannerProvider: Send + Sync {
    /// Generate raw structured output for a planner prompt. Transport-level
    /// failures (timeouts, connection errors, bad-gateway responses) map to
    /// `UpstreamUnavailable` so the resolver knows they are retryable.
    async fn generate(&self, prompt: &str) -> GovResult<String>;

    fn info(&self) -> ProviderInfo;
}

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub model: String,
}

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    /// OpenAI-compatible chat-completions endpoint (OpenRouter included).
    OpenAi,
    /// Deterministic stub for tests; refused outside test builds unless
    /// explicitly enabled.
    Stub,
}

impl ProviderKind {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "ollama" => Some(ProviderKind::Ollama),
            "openai" | "openai-compatible" | "openrouter" => Some(ProviderKind::OpenAi),
            "stub" => Some(ProviderKind::Stub),
            _ => None,
        }
    }
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &PlannerConfig) -> GovResult<Arc<dyn PlannerProvider>> {
        match config.provider {
            ProviderKind::Ollama => Ok(Arc::new(OllamaPlanner::new(config)?)),
            ProviderKind::OpenAi => Ok(Arc::new(OpenAiPlanner::new(config)?)),
            ProviderKind::Stub => {
                let allowed = std::env::var("GEOGOV_ALLOW_STUB_PLANNER")
                    .map(|v| v == "1" || v == "true")
                    .unwrap_or(false)
                    || cfg!(test);
                if !allowed {
                    return Err(GovError::Internal(
                        "stub planner is not allowed outside tests; set \
                         GEOGOV_ALLOW_STUB_PLANNER=1 to override"
                            .to_string(),
                    ));
                }
                Ok(Arc::new(StubPlanner::default()))
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> GovError {
    GovError::UpstreamUnavailable(format!("planner transport error: {}", err))
}

fn build_client(config: &PlannerConfig) -> GovResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| GovError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Local Ollama backend: `POST /api/generate` with JSON-constrained output
/// and temperature pinned to zero.
pub struct OllamaPlanner {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaPlanner {
    pub fn new(config: &PlannerConfig) -> GovResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl PlannerProvider for OllamaPlanner {
    async fn generate(&self, prompt: &str) -> GovResult<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": { "temperature": 0 },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovError::UpstreamUnavailable(format!(
                "planner returned status {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        body.get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GovError::Validation(
                    "planner response missing string field 'response'".to_string(),
                )
            })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama",
            model: self.model.clone(),
        }
    }
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiPlanner {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiPlanner {
    pub fn new(config: &PlannerConfig) -> GovResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GovError::Internal("openai planner requires an API key".to_string()))?;
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl PlannerProvider for OpenAiPlanner {
    async fn generate(&self, prompt: &str) -> GovResult<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovError::UpstreamUnavailable(format!(
                "planner returned status {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        body.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GovError::Validation("planner response missing message content".to_string())
            })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai",
            model: self.model.clone(),
        }
    }
}

/// Deterministic offline backend for tests.
///
/// If the prompt itself embeds an operation object, that object is echoed
/// back verbatim, which lets tests drive arbitrary candidates through the
/// full resolver path. Otherwise a small keyword table produces a canned
/// operation.
#[derive(Default)]
pub struct StubPlanner;

#[async_trait]
impl PlannerProvider for StubPlanner {
    async fn generate(&self, prompt: &str) -> GovResult<String> {
        if let Some(embedded) = extract::extract_json_objects(prompt)
            .into_iter()
            .find(|o| o.get("operation").is_some())
        {
            return Ok(embedded.to_string());
        }

        let lowered = prompt.to_lowercase();
        let canned = if lowered.contains("buffer") {
            serde_json::json!({
                "operation": "buffer",
                "geometry": {"type": "Point", "coordinates": [-122.42, 37.77]},
                "distance": 500.0,
                "units": "meters",
            })
        } else if lowered.contains("area") {
            serde_json::json!({
                "operation": "area",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-122.42, 37.77], [-122.41, 37.77],
                                     [-122.41, 37.78], [-122.42, 37.77]]],
                },
                "units": "square_meters",
            })
        } else if lowered.contains("nearest") {
            serde_json::json!({
                "operation": "nearest_neighbors",
                "geometry": {"type": "Point", "coordinates": [-122.42, 37.77]},
                "dataset": "data.features",
                "limit": 5,
            })
        } else {
            serde_json::json!({
                "operation": "area",
                "geometry": {"type": "Point", "coordinates": [-122.42, 37.77]},
            })
        };
        Ok(canned.to_string())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "stub",
            model: "stub".to_string(),
        }
    }
}
