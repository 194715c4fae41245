//! Chat-completion dispatch shared by answer generation (`composer.rs`) and
//! knowledge-graph triple extraction (`graph_extract.rs`). Structured the
//! same way as `embedding::create_provider`'s per-[`LlmProvider`] dispatch,
//! but for a single free-form prompt → text completion rather than a batch
//! embedding call, since chat and embeddings are different API surfaces even
//! on the same provider.

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::{EngineError, Result};

/// Send `prompt` to the configured LLM provider's chat-completion endpoint
/// and return the raw text response.
pub async fn complete(llm: &LlmConfig, prompt: &str) -> Result<String> {
    match llm.provider {
        LlmProvider::Openai | LlmProvider::AzureOpenai => complete_openai(llm, prompt).await,
        LlmProvider::Ollama => complete_ollama(llm, prompt).await,
        LlmProvider::Gemini | LlmProvider::Anthropic => Err(EngineError::ModelIO(format!(
            "chat completion for provider '{:?}' is not wired in this build",
            llm.provider
        ))),
    }
}

async fn complete_openai(llm: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| EngineError::ModelIO("OPENAI_API_KEY environment variable not set".to_string()))?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(llm.timeout_secs))
        .build()
        .map_err(|e| EngineError::ModelIO(e.to_string()))?;

    let model = llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
    let body = serde_json::json!({
        "model": model,
        "temperature": llm.temperature,
        "messages": [{ "role": "user", "content": prompt }],
    });

    let resp = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&body)
        .send()
        .await
        .map_err(|e| EngineError::ModelIO(format!("OpenAI chat request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(EngineError::ModelIO(format!("OpenAI chat returned {}", resp.status())));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| EngineError::ModelIO(format!("invalid OpenAI response: {e}")))?;
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::ModelIO("OpenAI response missing message content".to_string()))
}

async fn complete_ollama(llm: &LlmConfig, prompt: &str) -> Result<String> {
    let base_url = llm.base_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string());
    let model = llm.model.clone().unwrap_or_else(|| "llama3".to_string());
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(llm.timeout_secs))
        .build()
        .map_err(|e| EngineError::ModelIO(e.to_string()))?;

    let resp = client
        .post(format!("{base_url}/api/generate"))
        .json(&serde_json::json!({ "model": model, "prompt": prompt, "stream": false }))
        .send()
        .await
        .map_err(|e| EngineError::ModelIO(format!("Ollama chat request failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(EngineError::ModelIO(format!("Ollama chat returned {}", resp.status())));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| EngineError::ModelIO(format!("invalid Ollama response: {e}")))?;
    json.get("response")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EngineError::ModelIO("Ollama response missing 'response' field".to_string()))
}
