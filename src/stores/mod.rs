//! Capability interfaces for the three index writers / retrievers (C4),
//! replacing the source's framework-supplied `PropertyGraphIndex` /
//! `VectorStoreIndex` / `QueryFusionRetriever` inheritance hierarchies with
//! explicit composition: one trait per modality, one concrete store per
//! configured backend (SPEC_FULL §4.4/§9).

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::Triple;

pub mod elasticsearch;
pub mod fulltext_sqlite;
pub mod kuzu;
pub mod neo4j;
pub mod opensearch;
pub mod qdrant;

/// Bookkeeping carried alongside every written chunk so a store can answer
/// queries without a join back to the ambient `documents`/`chunks` tables.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub source: String,
    pub file_name: String,
    pub file_type: String,
}

/// One hit from a single-modality retriever, before fusion. Carries enough
/// to build a [`crate::models::SearchResultItem`] once ranked.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f64,
    pub text: String,
    pub source: String,
    pub file_name: String,
    pub file_type: String,
}

/// Writes and queries embedding vectors. Implementations must validate that
/// a write's embedding length agrees with the store's established dimension
/// (SPEC_FULL §4.4 P3) and reject mismatched writes rather than silently
/// truncating or padding.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        text: &str,
        metadata: &ChunkMetadata,
    ) -> Result<()>;

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>>;
}

/// Writes and queries property-graph triples.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_triples(&self, triples: &[Triple], metadata: &ChunkMetadata) -> Result<()>;
    async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<RetrievalCandidate>>;
}

/// Writes and queries full text (BM25 in-process, or an external search
/// engine's native indexing).
#[async_trait]
pub trait FullTextStore: Send + Sync {
    async fn index(&self, chunk_id: &str, text: &str, metadata: &ChunkMetadata) -> Result<()>;
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalCandidate>>;
}
