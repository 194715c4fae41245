//! Built-in BM25 full-text store, backed by SQLite FTS5 — the teacher's own
//! keyword-search idiom (`src/search.rs::fetch_keyword_candidates`), which is
//! itself a BM25-ranking full-text index and so a faithful substitution for
//! the source's in-process BM25 docstore (SPEC_FULL §4.4).

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::errors::{EngineError, Result};

use super::{ChunkMetadata, FullTextStore, RetrievalCandidate};

pub struct SqliteFullTextStore {
    pool: SqlitePool,
}

impl SqliteFullTextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FullTextStore for SqliteFullTextStore {
    async fn index(&self, chunk_id: &str, text: &str, metadata: &ChunkMetadata) -> Result<()> {
        sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::BackendIO(format!("fts delete failed: {e}")))?;

        sqlx::query(
            "INSERT INTO chunks_fts (chunk_id, document_id, source, file_name, file_type, text) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(chunk_id)
        .bind(&metadata.document_id)
        .bind(&metadata.source)
        .bind(&metadata.file_name)
        .bind(&metadata.file_type)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::BackendIO(format!("fts insert failed: {e}")))?;

        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalCandidate>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, source, file_name, file_type, rank,
                   snippet(chunks_fts, 5, '>>>', '<<<', '...', 48) AS snippet
            FROM chunks_fts
            WHERE chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(text)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::BackendIO(format!("fts query failed: {e}")))?;

        // FTS5 `rank` is negative, lower (more negative) is a better match;
        // negate it so higher scores win like every other retriever here.
        let candidates = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                RetrievalCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    score: -rank,
                    text: row.get("snippet"),
                    source: row.get("source"),
                    file_name: row.get("file_name"),
                    file_type: row.get("file_type"),
                }
            })
            .collect();

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

    fn meta() -> ChunkMetadata {
        ChunkMetadata {
            document_id: "doc-1".to_string(),
            source: "filesystem".to_string(),
            file_name: "notes.md".to_string(),
            file_type: "text/markdown".to_string(),
        }
    }

    #[tokio::test]
    async fn indexes_and_finds_by_keyword() {
        let pool = test_pool().await;
        let store = SqliteFullTextStore::new(pool);
        store
            .index("c1", "the spice melange flows across Arrakis", &meta())
            .await
            .unwrap();

        let hits = store.query("melange", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c1");
        assert_eq!(hits[0].document_id, "doc-1");
    }

    #[tokio::test]
    async fn reindexing_a_chunk_replaces_the_previous_entry() {
        let pool = test_pool().await;
        let store = SqliteFullTextStore::new(pool);
        store.index("c1", "original text about deserts", &meta()).await.unwrap();
        store.index("c1", "revised text about oceans", &meta()).await.unwrap();

        assert!(store.query("deserts", 10).await.unwrap().is_empty());
        assert_eq!(store.query("oceans", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_query_returns_no_results() {
        let pool = test_pool().await;
        let store = SqliteFullTextStore::new(pool);
        store.index("c1", "some text", &meta()).await.unwrap();
        assert!(store.query("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn respects_the_requested_limit() {
        let pool = test_pool().await;
        let store = SqliteFullTextStore::new(pool);
        for i in 0..5 {
            let mut m = meta();
            m.document_id = format!("doc-{i}");
            store
                .index(&format!("c{i}"), "shared keyword appears here", &m)
                .await
                .unwrap();
        }

        let hits = store.query("shared", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
