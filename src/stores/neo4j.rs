//! Neo4j vector + graph store.
//!
//! Neo4j is the one backend that can serve both `VectorStore` and
//! `GraphStore` over the same connection (SPEC_FULL §4.4: "For stores that
//! share a connection with the graph store... the vector index name is a
//! configured constant"). No Neo4j driver crate is in the pack, so this
//! talks to the HTTP Cypher transaction endpoint over `reqwest`, the same
//! REST-over-`reqwest` idiom used for the CMIS/Alfresco connectors.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Neo4jConfig;
use crate::errors::{EngineError, Result};
use crate::models::Triple;

use super::{ChunkMetadata, GraphStore, RetrievalCandidate, VectorStore};

pub struct Neo4jStore {
    config: Neo4jConfig,
    client: reqwest::Client,
}

impl Neo4jStore {
    pub fn new(config: Neo4jConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn tx_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }

    async fn run(&self, statements: Vec<Value>) -> Result<Value> {
        let resp = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await
            .map_err(|e| EngineError::BackendIO(format!("neo4j request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(EngineError::BackendIO(format!(
                "neo4j request returned {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EngineError::BackendIO(format!("invalid neo4j response: {e}")))?;

        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(EngineError::BackendIO(format!("neo4j reported errors: {errors:?}")));
            }
        }

        Ok(body)
    }
}

fn vector_upsert_statement(
    chunk_id: &str,
    embedding: &[f32],
    text: &str,
    metadata: &ChunkMetadata,
) -> Value {
    json!({
        "statement": "MERGE (c:Chunk {id: $id}) \
                      SET c.document_id = $document_id, c.source = $source, \
                          c.file_name = $file_name, c.file_type = $file_type, \
                          c.text = $text, c.embedding = $embedding",
        "parameters": {
            "id": chunk_id,
            "document_id": metadata.document_id,
            "source": metadata.source,
            "file_name": metadata.file_name,
            "file_type": metadata.file_type,
            "text": text,
            "embedding": embedding,
        }
    })
}

fn vector_query_statement(index_name: &str, embedding: &[f32], k: usize) -> Value {
    json!({
        "statement": "CALL db.index.vector.queryNodes($index_name, $k, $embedding) \
                      YIELD node, score \
                      RETURN node.id AS chunk_id, node.document_id AS document_id, \
                             node.text AS text, node.source AS source, \
                             node.file_name AS file_name, node.file_type AS file_type, score",
        "parameters": {
            "index_name": index_name,
            "k": k,
            "embedding": embedding,
        }
    })
}

fn parse_candidates(body: &Value) -> Vec<RetrievalCandidate> {
    let mut out = Vec::new();
    let Some(results) = body.get("results").and_then(|r| r.as_array()) else { return out };
    for result in results {
        let Some(columns) = result.get("columns").and_then(|c| c.as_array()) else { continue };
        let col_index = |name: &str| columns.iter().position(|c| c.as_str() == Some(name));
        let Some(data) = result.get("data").and_then(|d| d.as_array()) else { continue };
        for row in data {
            let Some(row_values) = row.get("row").and_then(|r| r.as_array()) else { continue };
            let get = |name: &str| -> Option<&Value> {
                col_index(name).and_then(|i| row_values.get(i))
            };
            let chunk_id = get("chunk_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            if chunk_id.is_empty() {
                continue;
            }
            out.push(RetrievalCandidate {
                chunk_id,
                document_id: get("document_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                text: get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                source: get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_name: get("file_name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                file_type: get("file_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            });
        }
    }
    out
}

#[async_trait]
impl VectorStore for Neo4jStore {
    async fn upsert(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        text: &str,
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        if embedding.len() != self.config.embed_dim {
            return Err(EngineError::BackendIO(format!(
                "embedding length {} disagrees with neo4j index dimension {}",
                embedding.len(),
                self.config.embed_dim
            )));
        }
        self.run(vec![vector_upsert_statement(chunk_id, embedding, text, metadata)])
            .await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let body = self
            .run(vec![vector_query_statement(&self.config.index_name, embedding, k)])
            .await?;
        Ok(parse_candidates(&body))
    }
}

fn graph_upsert_statement(triple: &Triple) -> Value {
    json!({
        "statement": "MERGE (s:Entity {name: $subject}) SET s.label = $subject_label \
                      MERGE (o:Entity {name: $object}) SET o.label = $object_label \
                      MERGE (s)-[r:RELATES {type: $relation}]->(o) SET r.chunk_id = $chunk_id",
        "parameters": {
            "subject": triple.subject,
            "subject_label": triple.subject_label.clone().unwrap_or_default(),
            "object": triple.object,
            "object_label": triple.object_label.clone().unwrap_or_default(),
            "relation": triple.relation,
            "chunk_id": triple.chunk_id,
        }
    })
}

fn graph_retrieve_statement(query_text: &str, k: usize) -> Value {
    json!({
        "statement": "MATCH (s:Entity)-[r:RELATES]->(o:Entity) \
                      WHERE toLower(s.name) CONTAINS toLower($term) OR toLower(o.name) CONTAINS toLower($term) \
                      MATCH (c:Chunk {id: r.chunk_id}) \
                      RETURN c.id AS chunk_id, c.document_id AS document_id, c.source AS source, \
                             c.file_name AS file_name, c.file_type AS file_type, \
                             (s.name + ' -> ' + r.type + ' -> ' + o.name) AS text, 1.0 AS score \
                      LIMIT $k",
        "parameters": { "term": query_text, "k": k }
    })
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn upsert_triples(&self, triples: &[Triple], _metadata: &ChunkMetadata) -> Result<()> {
        let statements = triples.iter().map(graph_upsert_statement).collect();
        self.run(statements).await?;
        Ok(())
    }

    async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<RetrievalCandidate>> {
        let terms: Vec<&str> = query_text.split_whitespace().filter(|t| t.len() > 2).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let statements = terms.iter().map(|t| graph_retrieve_statement(t, k)).collect();
        let body = self.run(statements).await?;
        let mut candidates = parse_candidates(&body);
        candidates.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        candidates.dedup_by(|a, b| a.chunk_id == b.chunk_id);
        candidates.truncate(k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            document_id: "doc-1".to_string(),
            source: "filesystem".to_string(),
            file_name: "notes.md".to_string(),
            file_type: "text/markdown".to_string(),
        }
    }

    #[test]
    fn vector_upsert_statement_binds_expected_parameters() {
        let stmt = vector_upsert_statement("c1", &[0.1, 0.2], "hello", &meta());
        assert_eq!(stmt["parameters"]["id"], "c1");
        assert_eq!(stmt["parameters"]["text"], "hello");
        assert_eq!(stmt["parameters"]["embedding"][1], 0.2);
    }

    #[test]
    fn vector_query_statement_carries_index_name_and_k() {
        let stmt = vector_query_statement("hybrid_search_vector", &[0.1], 7);
        assert_eq!(stmt["parameters"]["index_name"], "hybrid_search_vector");
        assert_eq!(stmt["parameters"]["k"], 7);
    }

    #[test]
    fn parses_candidates_from_a_cypher_http_response() {
        let body = json!({
            "results": [{
                "columns": ["chunk_id", "document_id", "text", "source", "file_name", "file_type", "score"],
                "data": [{
                    "row": ["c1", "doc-1", "some text", "filesystem", "notes.md", "text/markdown", 0.87]
                }]
            }],
            "errors": []
        });
        let candidates = parse_candidates(&body);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk_id, "c1");
        assert!((candidates[0].score - 0.87).abs() < 1e-9);
    }

    #[test]
    fn parse_candidates_skips_rows_missing_a_chunk_id() {
        let body = json!({ "results": [{ "columns": ["chunk_id"], "data": [{ "row": [Value::Null] }] }] });
        assert!(parse_candidates(&body).is_empty());
    }
}
