//! OpenSearch vector + full-text store, over its REST `_doc`/`_search` API.
//! When the configured vector and search backends are the same OpenSearch
//! instance, [`OpenSearchStore::hybrid_query`] is used directly by the
//! composer instead of separate vector/text retrievers, per SPEC_FULL §4.4's
//! native-hybrid composition rule.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::OpenSearchConfig;
use crate::errors::{EngineError, Result};

use super::{ChunkMetadata, FullTextStore, RetrievalCandidate, VectorStore};

pub struct OpenSearchStore {
    config: OpenSearchConfig,
    client: reqwest::Client,
}

impl OpenSearchStore {
    pub fn new(config: OpenSearchConfig) -> Self {
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

    fn search_url(&self, pipeline: Option<&str>) -> String {
        let base = format!("{}/{}/_search", self.config.url.trim_end_matches('/'), self.config.index_name);
        match pipeline {
            Some(p) => format!("{base}?search_pipeline={p}"),
            None => base,
        }
    }

    async fn index_document(&self, chunk_id: &str, body: Value) -> Result<()> {
        let resp = self
            .request(self.client.put(self.doc_url(chunk_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("opensearch index failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "opensearch index returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn search(&self, query: Value, pipeline: Option<&str>) -> Result<Vec<RetrievalCandidate>> {
        let resp = self
            .request(self.client.post(self.search_url(pipeline)))
            .json(&query)
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("opensearch search failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "opensearch search returned {}",
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::BackendIO(format!("invalid opensearch response: {e}")))?;
        Ok(parse_hits(&body))
    }

    /// Single-query native hybrid search: normalizes vector and text scores
    /// (`min_max`) and combines them (`harmonic_mean`) via the named
    /// `search_pipeline`, skipping a separate text retriever entirely
    /// (SPEC_FULL §4.5 "OpenSearch native hybrid").
    pub async fn hybrid_query(&self, query_text: &str, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let query = hybrid_query_body(&self.config.text_field, &self.config.embedding_field, query_text, embedding, k);
        self.search(query, Some(&self.config.search_pipeline)).await
    }
}

fn hybrid_query_body(text_field: &str, embedding_field: &str, query_text: &str, embedding: &[f32], k: usize) -> Value {
    json!({
        "size": k,
        "query": {
            "hybrid": {
                "queries": [
                    { "match": { (text_field): { "query": query_text } } },
                    { "knn": { (embedding_field): { "vector": embedding, "k": k } } }
                ]
            }
        }
    })
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
impl VectorStore for OpenSearchStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        text: &str,
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        if embedding.len() != self.config.embed_dim {
            return Err(EngineError::BackendIO(format!(
                "embedding length {} disagrees with opensearch index dimension {}",
                embedding.len(),
                self.config.embed_dim
            )));
        }
        let mut body = json!({
            "document_id": metadata.document_id,
            "source": metadata.source,
            "file_name": metadata.file_name,
            "file_type": metadata.file_type,
            "text": text,
        });
        body[&self.config.embedding_field] = json!(embedding);
        self.index_document(chunk_id, body).await
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let query = json!({
            "size": k,
            "query": { "knn": { (self.config.embedding_field.clone()): { "vector": embedding, "k": k } } }
        });
        self.search(query, None).await
    }
}

#[async_trait]
impl FullTextStore for OpenSearchStore {
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
            "size": k,
            "query": { "match": { (self.config.text_field.clone()): text } }
        });
        self.search(query, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_query_body_includes_both_match_and_knn_clauses() {
        let body = hybrid_query_body("content", "embedding", "dune", &[0.1, 0.2], 10);
        let queries = body["query"]["hybrid"]["queries"].as_array().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0]["match"]["content"]["query"], "dune");
        assert_eq!(queries[1]["knn"]["embedding"]["k"], 10);
    }

    #[test]
    fn parses_hits_into_candidates() {
        let body = json!({
            "hits": { "hits": [{
                "_id": "c1", "_score": 1.5,
                "_source": { "document_id": "doc-1", "source": "filesystem", "file_name": "n.md", "file_type": "text/markdown", "text": "hi" }
            }] }
        });
        assert_eq!(parse_hits(&body).len(), 1);
    }
}
