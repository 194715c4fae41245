//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when no backend needs vectors.
//! - **[`OpenAIProvider`]** — calls the OpenAI embeddings API with batching, retry, and backoff.
//! - **[`OllamaProvider`]** — calls a local Ollama embeddings endpoint.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::{LlmConfig, LlmProvider};

/// Trait for embedding providers. Dispatch happens through
/// [`create_provider`]; the trait itself is object-safe so the engine holds
/// a single `Box<dyn EmbeddingProvider>` regardless of which backend is active.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed_texts(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors. Used when no
/// enabled backend requires vectors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`). Requires
/// the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .embedding_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.embedding_model required for OpenAI embeddings"))?;
        let dims = config
            .embedding_dims
            .ok_or_else(|| anyhow::anyhow!("llm.embedding_dims required for OpenAI embeddings"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            timeout_secs: config.timeout_secs,
            max_retries: 5,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_openai(
            &self.model,
            self.timeout_secs,
            self.max_retries,
            texts,
        )
        .await
    }
}

/// Call the OpenAI embeddings API with retry/backoff.
async fn embed_openai(
    model: &str,
    timeout_secs: u64,
    max_retries: u32,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama server's `/api/embeddings` endpoint.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    base_url: String,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .embedding_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.embedding_model required for Ollama embeddings"))?;
        let dims = config
            .embedding_dims
            .ok_or_else(|| anyhow::anyhow!("llm.embedding_dims required for Ollama embeddings"))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            base_url,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let resp = client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&serde_json::json!({ "model": self.model, "prompt": text }))
                .send()
                .await?;
            if !resp.status().is_success() {
                bail!("Ollama embeddings error: {}", resp.status());
            }
            let json: serde_json::Value = resp.json().await?;
            let vec: Vec<f32> = json
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embedding"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            embeddings.push(vec);
        }
        Ok(embeddings)
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
/// `enabled` is `false` when no configured backend needs vectors (no
/// vector backend and no OpenSearch/Elasticsearch native-hybrid in play).
pub fn create_provider(config: &LlmConfig, enabled: bool) -> Result<Box<dyn EmbeddingProvider>> {
    if !enabled {
        return Ok(Box::new(DisabledProvider));
    }
    match config.provider {
        LlmProvider::Openai | LlmProvider::AzureOpenai => Ok(Box::new(OpenAIProvider::new(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaProvider::new(config)?)),
        LlmProvider::Gemini | LlmProvider::Anthropic => {
            bail!("embedding provider '{:?}' has no native embeddings endpoint in this build; configure an openai or ollama embedding_model instead", config.provider)
        }
    }
}

