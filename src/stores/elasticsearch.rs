//! Elasticsearch vector + full-text store, over its REST `_doc`/`_search`
//! API (SPEC_FULL §4.4: "writes chunk text and (optionally) embeddings to a
//! named index using the store's native indexing"). One struct serves both
//! `VectorStore` and `FullTextStore` since both write to the same document.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ElasticsearchConfig;
use crate::errors::{EngineError, Result};

use super::{ChunkMetadata, FullTextStore, RetrievalCandidate, VectorStore};

pub struct ElasticsearchStore {
    config: ElasticsearchConfig,
    client: reqwest::Client,
}

impl ElasticsearchStore {
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => builder.basic_auth(u, Some(p)),
            _ => builder,
        }
    }

    fn doc_url(&self, chunk_id: &str) -> String {
        format!(
            "{}/{}/_doc/{}",
            self.config.url.trim_end_matches('/'),
            self.config.index_name,
            chunk_id
        )
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.config.url.trim_end_matches('/'), self.config.index_name)
    }

    async fn index_document(&self, chunk_id: &str, body: Value) -> Result<()> {
        let resp = self
            .request(self.client.put(self.doc_url(chunk_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("elasticsearch index failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "elasticsearch index returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn search(&self, query: Value) -> Result<Vec<RetrievalCandidate>> {
        let resp = self
            .request(self.client.post(self.search_url()))
            .json(&query)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("elasticsearch search failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "elasticsearch search returned {}",
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::BackendIO(format!("invalid elasticsearch response: {e}")))?;
        Ok(parse_hits(&body))
    }
}

fn parse_hits(body: &Value) -> Vec<RetrievalCandidate> {
    let Some(hits) = body.pointer("/hits/hits").and_then(|h| h.as_array()) else { return Vec::new() };
    hits.iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?;
            let chunk_id = hit.get("_id")?.as_str()?.to_string();
            Some(RetrievalCandidate {
                chunk_id,
                document_id: source.get("document_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: hit.get("_score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                text: source.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                source: source.get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_name: source.get("file_name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_type: source.get("file_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for ElasticsearchStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        text: &str,
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        if embedding.len() != self.config.embed_dim {
            return Err(EngineError::BackendIO(format!(
                "embedding length {} disagrees with elasticsearch index dimension {}",
                embedding.len(),
                self.config.embed_dim
            )));
        }
        let body = json!({
            "document_id": metadata.document_id,
            "source": metadata.source,
            "file_name": metadata.file_name,
            "file_type": metadata.file_type,
            "text": text,
            "embedding": embedding,
        });
        self.index_document(chunk_id, body).await
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let query = json!({
            "knn": {
                "field": "embedding",
                "query_vector": embedding,
                "k": k,
                "num_candidates": (k * 10).max(50),
            },
            "size": k,
        });
        self.search(query).await
    }
}

#[async_trait]
impl FullTextStore for ElasticsearchStore {
    async fn index(&self, chunk_id: &str, text: &str, metadata: &ChunkMetadata) -> Result<()> {
        let body = json!({
            "document_id": metadata.document_id,
            "source": metadata.source,
            "file_name": metadata.file_name,
            "file_type": metadata.file_type,
            "text": text,
        });
        self.index_document(chunk_id, body).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalCandidate>> {
        let query = json!({
            "query": { "match": { "text": text } },
            "size": k,
        });
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hits_into_candidates() {
        let body = json!({
            "hits": {
                "hits": [{
                    "_id": "c1",
                    "_score": 4.2,
                    "_source": {
                        "document_id": "doc-1",
                        "source": "filesystem",
                        "file_name": "notes.md",
                        "file_type": "text/markdown",
                        "text": "hello"
                    }
                }]
            }
        });
        let candidates = parse_hits(&body);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk_id, "c1");
        assert!((candidates[0].score - 4.2).abs() < 1e-9);
    }

    #[test]
    fn missing_hits_array_yields_no_candidates() {
        assert!(parse_hits(&json!({})).is_empty());
    }
}
