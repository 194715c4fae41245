//! # Hybrid Retrieval Engine
//!
//! **A hybrid document retrieval engine combining dense vector search, sparse
//! BM25 keyword search, and LLM-extracted property-graph retrieval, fused by
//! reciprocal-rank fusion.**
//!
//! Documents are ingested from a configured source (filesystem, CMIS, or
//! Alfresco repository, or pasted text), converted to a canonical text form,
//! chunked, enriched with keywords and a rolling summary, and written into
//! whichever of the three retrieval backends are configured. Queries fan out
//! to every configured backend concurrently, fuse the ranked lists, and
//! (optionally) ground an LLM answer in the fused context.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌───────────────┐
//! │ Connector │──▶│ Converter │──▶│ Chunk+     │──▶│ Vector/Graph/ │
//! │ FS/CMIS/  │   │ PDF/DOCX/ │   │ Enrich     │   │ Full-text     │
//! │ Alfresco  │   │ PPTX/...  │   │            │   │ stores        │
//! └───────────┘   └───────────┘   └────────────┘   └──────┬────────┘
//!                                                          │
//!                                    ┌─────────────────────┤
//!                                    ▼                     ▼
//!                              ┌───────────┐         ┌───────────┐
//!                              │  Composer │────────▶│    LLM    │
//!                              │  (fusion) │         │  (answer) │
//!                              └───────────┘         └───────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. **Connectors** ([`connectors`]) scan a configured source and produce
//!    [`models::SourceItem`]s.
//! 2. The **converter** ([`extract`]) turns each item's bytes into canonical
//!    markdown or plain text.
//! 3. The **ingestion pipeline** ([`ingest`]) persists [`models::Document`]s,
//!    splits them into [`models::Chunk`]s ([`chunk`]), and enriches each chunk
//!    with keywords and a rolling summary ([`enrich`]).
//! 4. Chunks are embedded ([`embedding`]), triple-extracted ([`graph_extract`])
//!    and written to whichever of the vector/graph/full-text stores
//!    ([`stores`]) are configured.
//! 5. The **composer** ([`composer`]) fans a query out to every configured
//!    store, fuses the ranked lists ([`fusion`]), deduplicates near-identical
//!    hits ([`dedup`]), and optionally asks an LLM ([`llm_chat`]) for a
//!    grounded answer.
//! 6. Long-running ingestions are tracked by the **job registry** ([`jobs`])
//!    with progress, ETA, and cooperative cancellation.
//! 7. The **CLI** (`hre`) and the **HTTP server** ([`server`]) both drive the
//!    same [`engine::Engine`].
//!
//! ## Backends
//!
//! | Modality | Backends | Module |
//! |----------|----------|--------|
//! | Vector | Qdrant, Neo4j, Elasticsearch, OpenSearch | [`stores::qdrant`], [`stores::neo4j`], [`stores::elasticsearch`], [`stores::opensearch`] |
//! | Graph | Neo4j, Kuzu | [`stores::neo4j`], [`stores::kuzu`] |
//! | Full-text | embedded BM25 (SQLite FTS5), Elasticsearch, OpenSearch | [`stores::fulltext_sqlite`], [`stores::elasticsearch`], [`stores::opensearch`] |
//!
//! When vector and full-text are both configured against the same OpenSearch
//! instance, a single `hybrid` query replaces the separate retrievers.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`errors`] | The crate's typed error enum |
//! | [`models`] | Core data types: `SourceItem`, `Document`, `Chunk`, `Triple`, `Job`, ... |
//! | [`connectors`] | Filesystem / CMIS / Alfresco document sources |
//! | [`extract`] | Document-to-canonical-text conversion (PDF/DOCX/PPTX/XLSX/HTML/...) |
//! | [`chunk`] | Sentence-aware text chunker |
//! | [`enrich`] | Keyword extraction and rolling summaries |
//! | [`embedding`] | Embedding provider trait and per-provider implementations |
//! | [`graph_extract`] | LLM-backed property-graph triple extraction |
//! | [`llm_chat`] | Shared chat-completion dispatch (answers + triple extraction) |
//! | [`stores`] | `VectorStore` / `GraphStore` / `FullTextStore` traits and backends |
//! | [`fusion`] | Reciprocal-rank fusion and post-fusion score filtering |
//! | [`dedup`] | Near-duplicate result suppression |
//! | [`composer`] | Retrieval composer: fan-out, fuse, dedup, answer |
//! | [`jobs`] | Ingestion job registry: progress, ETA, cancellation |
//! | [`engine`] | The explicit, `Arc`-held application context |
//! | [`ingest`] | Ingestion pipeline orchestrator |
//! | [`sources`] | Configured-source health and status listing |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`server`] | HTTP server (Axum) exposing the operational API |
//! | [`progress`] | CLI progress reporting |
//!
//! ## Configuration
//!
//! The engine is configured via a TOML file (default: `config/hre.toml`). See
//! [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod chunk;
pub mod composer;
pub mod config;
pub mod connectors;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod enrich;
pub mod errors;
pub mod extract;
pub mod fusion;
pub mod graph_extract;
pub mod ingest;
pub mod jobs;
pub mod llm_chat;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod server;
pub mod sources;
pub mod stores;
