//! Qdrant vector store, talking to Qdrant's HTTP REST API over `reqwest`
//! (SPEC_FULL §3/§6 connection shape; no native Qdrant client crate is in
//! the pack).

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::QdrantConfig;
use crate::errors::{EngineError, Result};

use super::{ChunkMetadata, RetrievalCandidate, VectorStore};

pub struct QdrantStore {
    config: QdrantConfig,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: QdrantConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.https { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.config.host, self.config.port)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Qdrant point IDs must be a u64 or UUID; chunk ids here are arbitrary
    /// strings, so deterministically derive a UUIDv5 from the chunk id.
    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        text: &str,
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        if embedding.len() != self.config.embed_dim {
            return Err(EngineError::BackendIO(format!(
                "embedding length {} disagrees with qdrant collection dimension {}",
                embedding.len(),
                self.config.embed_dim
            )));
        }

        let url = format!(
            "{}/collections/{}/points",
            self.base_url(),
            self.config.collection_name
        );
        let body = json!({
            "points": [{
                "id": Self::point_id(chunk_id),
                "vector": embedding,
                "payload": {
                    "chunk_id": chunk_id,
                    "document_id": metadata.document_id,
                    "source": metadata.source,
                    "file_name": metadata.file_name,
                    "file_type": metadata.file_type,
                    "text": text,
                }
            }]
        });

        let resp = self
            .request(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("qdrant upsert failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "qdrant upsert returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url(),
            self.config.collection_name
        );
        let body = json!({ "vector": embedding, "limit": k, "with_payload": true });

        let resp = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("qdrant query failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "qdrant query returned {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::BackendIO(format!("invalid qdrant response: {e}")))?;
        Ok(parse_search_response(&body))
    }
}

fn parse_search_response(body: &Value) -> Vec<RetrievalCandidate> {
    let Some(result) = body.get("result").and_then(|r| r.as_array()) else { return Vec::new() };
    result
        .iter()
        .filter_map(|hit| {
            let payload = hit.get("payload")?;
            let chunk_id = payload.get("chunk_id")?.as_str()?.to_string();
            Some(RetrievalCandidate {
                chunk_id,
                document_id: payload.get("document_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: hit.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                text: payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                source: payload.get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_name: payload.get("file_name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_type: payload.get("file_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic_for_the_same_chunk_id() {
        assert_eq!(QdrantStore::point_id("c1"), QdrantStore::point_id("c1"));
        assert_ne!(QdrantStore::point_id("c1"), QdrantStore::point_id("c2"));
    }

    #[test]
    fn parses_search_hits_with_payload() {
        let body = json!({
            "result": [{
                "id": "uuid-1",
                "score": 0.92,
                "payload": {
                    "chunk_id": "c1",
                    "document_id": "doc-1",
                    "source": "filesystem",
                    "file_name": "notes.md",
                    "file_type": "text/markdown",
                    "text": "hello world"
                }
            }]
        });
        let candidates = parse_search_response(&body);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk_id, "c1");
        assert!((candidates[0].score - 0.92).abs() < 1e-9);
    }

    #[test]
    fn skips_hits_with_no_payload() {
        let body = json!({ "result": [{ "id": "uuid-1", "score": 0.1 }] });
        assert!(parse_search_response(&body).is_empty());
    }
}
