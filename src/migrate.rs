//! Database schema migrations.
//!
//! Creates every table the ambient bookkeeping layer needs (documents,
//! chunks, checkpoints, chunks_fts) plus the tables used by the embedded
//! substitutes for backends the pack has no driver crate for (the BM25
//! full-text store and the Kuzu-shaped graph store; see DESIGN.md). Designed
//! to be run via `hre init` and safe to re-run.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations_on(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            conversion_method TEXT NOT NULL,
            text TEXT NOT NULL,
            dedup_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(source, file_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            keywords TEXT NOT NULL DEFAULT '[]',
            rolling_summary TEXT NOT NULL DEFAULT '',
            UNIQUE(document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            source TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                source UNINDEXED,
                file_name UNINDEXED,
                file_type UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Kuzu-shaped embedded graph store: typed node/relation tables,
    // materialized per DESIGN.md's resolution of the Kuzu Open Question.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kuzu_entities (
            name TEXT PRIMARY KEY,
            label TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kuzu_relations (
            subject TEXT NOT NULL,
            relation TEXT NOT NULL,
            object TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            PRIMARY KEY (subject, relation, object, chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_kuzu_relations_chunk_id ON kuzu_relations(chunk_id)")
        .execute(pool)
        .await?;

    Ok(())
}
