//! Kuzu-shaped embedded graph store.
//!
//! No Kuzu driver crate exists anywhere in the retrieval pack, so per
//! DESIGN.md's Open Question resolution this is implemented with the same
//! embedded-SQLite idiom the BM25 store uses, over the `kuzu_entities` /
//! `kuzu_relations` tables materialized in `migrate.rs`: a typed node table
//! and a typed relation table, matching Kuzu's own typed-table graph model
//! without fabricating a dependency on a crate that isn't in the corpus.
//!
//! Kuzu graph extraction is always schema-guided (SPEC_FULL §4.4); when no
//! user schema is active this store's node label defaults to `Entity`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::errors::{EngineError, Result};
use crate::models::Triple;

use super::{ChunkMetadata, GraphStore, RetrievalCandidate};

const DEFAULT_NODE_LABEL: &str = "Entity";

pub struct KuzuGraphStore {
    pool: SqlitePool,
    /// Gate on destructive schema reset between runs (SPEC_FULL §9 / §4.4):
    /// off by default, since a soft delete-and-recreate is only acceptable
    /// in development.
    allow_destructive_reset: bool,
}

impl KuzuGraphStore {
    pub fn new(pool: SqlitePool, allow_destructive_reset: bool) -> Self {
        Self { pool, allow_destructive_reset }
    }

    /// Drops and recreates the typed node/relation tables. Only ever invoked
    /// explicitly by the engine's setup path, and only when
    /// `allow_destructive_reset` is set.
    pub async fn reset(&self) -> Result<()> {
        if !self.allow_destructive_reset {
            return Err(EngineError::ConfigInvalid(
                "kuzu schema reset requested but graph.allow_destructive_reset is false".to_string(),
            ));
        }
        sqlx::query("DELETE FROM kuzu_relations")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu reset failed: {e}")))?;
        sqlx::query("DELETE FROM kuzu_entities")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu reset failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for KuzuGraphStore {
    async fn upsert_triples(&self, triples: &[Triple], _metadata: &ChunkMetadata) -> Result<()> {
        for triple in triples {
            sqlx::query(
                "INSERT INTO kuzu_entities (name, label) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET label = excluded.label",
            )
            .bind(&triple.subject)
            .bind(triple.subject_label.as_deref().unwrap_or(DEFAULT_NODE_LABEL))
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu entity upsert failed: {e}")))?;

            sqlx::query(
                "INSERT INTO kuzu_entities (name, label) VALUES (?, ?) \
                 ON CONFLICT(name) DO UPDATE SET label = excluded.label",
            )
            .bind(&triple.object)
            .bind(triple.object_label.as_deref().unwrap_or(DEFAULT_NODE_LABEL))
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu entity upsert failed: {e}")))?;

            sqlx::query(
                "INSERT OR IGNORE INTO kuzu_relations (subject, relation, object, chunk_id) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&triple.subject)
            .bind(&triple.relation)
            .bind(&triple.object)
            .bind(&triple.chunk_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu relation upsert failed: {e}")))?;
        }
        Ok(())
    }

    async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<RetrievalCandidate>> {
        let terms: Vec<&str> = query_text.split_whitespace().filter(|t| t.len() > 2).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Brute-force substring match over relations mentioning any query
        // term as subject or object; no full-text index exists for this
        // embedded substitute, matching Kuzu's own modest "traversal over a
        // small local graph" footprint.
        let mut candidates = Vec::new();
        for term in &terms {
            let pattern = format!("%{}%", term.to_lowercase());
            let rows = sqlx::query(
                r#"
                SELECT subject, relation, object, chunk_id
                FROM kuzu_relations
                WHERE lower(subject) LIKE ? OR lower(object) LIKE ?
                LIMIT ?
                "#,
            )
            .bind(&pattern)
            .bind(&pattern)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("kuzu retrieve failed: {e}")))?;

            for row in rows {
                let subject: String = row.get("subject");
                let relation: String = row.get("relation");
                let object: String = row.get("object");
                let chunk_id: String = row.get("chunk_id");
                let chunk_row = sqlx::query(
                    "SELECT document_id FROM chunks WHERE id = ?",
                )
                .bind(&chunk_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| EngineError::BackendIO(format!("kuzu chunk lookup failed: {e}")))?;
                let Some(chunk_row) = chunk_row else { continue };
                let document_id: String = chunk_row.get("document_id");

                let doc_row = sqlx::query(
                    "SELECT source, file_name, file_type FROM documents WHERE id = ?",
                )
                .bind(&document_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| EngineError::BackendIO(format!("kuzu document lookup failed: {e}")))?;
                let Some(doc_row) = doc_row else { continue };

                candidates.push(RetrievalCandidate {
                    chunk_id: chunk_id.clone(),
                    document_id,
                    score: 1.0,
                    text: format!("{subject} -> {relation} -> {object}"),
                    source: doc_row.get("source"),
                    file_name: doc_row.get("file_name"),
                    file_type: doc_row.get("file_type"),
                });
            }
        }

        candidates.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        candidates.dedup_by(|a, b| a.chunk_id == b.chunk_id && a.text == b.text);
        candidates.truncate(k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations_on;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations_on(&pool).await.unwrap();
        pool
    }

    fn triple() -> Triple {
        Triple {
            subject: "Paul Atreides".to_string(),
            subject_label: Some("Person".to_string()),
            relation: "RULES".to_string(),
            object: "Arrakis".to_string(),
            object_label: Some("Place".to_string()),
            chunk_id: "c1".to_string(),
        }
    }

    async fn seed_chunk(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO documents (id, source, file_name, file_type, conversion_method, text, dedup_hash, updated_at) \
             VALUES ('doc-1', 'filesystem', 'dune.md', 'text/markdown', 'plain_text', 'x', 'h', 0)",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO chunks (id, document_id, position, text) VALUES ('c1', 'doc-1', 0, 'text')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn upserts_entities_and_relations() {
        let pool = test_pool().await;
        seed_chunk(&pool).await;
        let store = KuzuGraphStore::new(pool.clone(), false);
        store
            .upsert_triples(&[triple()], &ChunkMetadata {
                document_id: "doc-1".to_string(),
                source: "filesystem".to_string(),
                file_name: "dune.md".to_string(),
                file_type: "text/markdown".to_string(),
            })
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kuzu_entities")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn retrieves_relations_mentioning_a_query_term() {
        let pool = test_pool().await;
        seed_chunk(&pool).await;
        let store = KuzuGraphStore::new(pool.clone(), false);
        store
            .upsert_triples(&[triple()], &ChunkMetadata {
                document_id: "doc-1".to_string(),
                source: "filesystem".to_string(),
                file_name: "dune.md".to_string(),
                file_type: "text/markdown".to_string(),
            })
            .await
            .unwrap();

        let hits = store.retrieve("tell me about Arrakis", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("Arrakis"));
    }

    #[tokio::test]
    async fn reset_is_refused_without_the_flag() {
        let pool = test_pool().await;
        let store = KuzuGraphStore::new(pool, false);
        assert!(store.reset().await.is_err());
    }
}
