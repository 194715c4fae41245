//! Core data types shared across the ingestion pipeline, the stores, and the
//! retrieval composer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw bytes fetched from a [`crate::connectors::Connector`], before conversion.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub display_name: String,
    pub source_id: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Canonical text plus metadata, produced by the document converter (C2).
/// Immutable after construction; discarded after ingestion except for the id
/// retained in stores.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source: String,
    pub file_name: String,
    pub file_type: String,
    pub conversion_method: ConversionMethod,
    pub text: String,
    pub dedup_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Which serialization the converter selected for a document, per SPEC_FULL §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMethod {
    Markdown,
    PlainText,
}

impl ConversionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionMethod::Markdown => "markdown",
            ConversionMethod::PlainText => "plain_text",
        }
    }
}

/// A contiguous sub-span of a document's canonical text, enriched with
/// derived metadata and (once C3 runs) an embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub keywords: Vec<String>,
    pub rolling_summary: String,
    pub embedding: Option<Vec<f32>>,
}

/// A `(subject, predicate, object)` triple extracted by the graph writer (C4),
/// with provenance back to the chunk that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub subject_label: Option<String>,
    pub relation: String,
    pub object: String,
    pub object_label: Option<String>,
    pub chunk_id: String,
}

/// A single fused, deduplicated search hit, matching the exact shape
/// `{ rank, content, score, source, file_type, file_name }` from SPEC_FULL §4.5.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub rank: usize,
    pub content: String,
    pub score: f64,
    pub source: String,
    pub file_type: String,
    pub file_name: String,
}

/// Status of an ingestion job, per SPEC_FULL §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

/// Per-file processing phase, per SPEC_FULL §3. `Docling` names the
/// conversion phase, preserved verbatim as externally-observed API shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePhase {
    Waiting,
    Docling,
    Chunking,
    KgExtraction,
    Indexing,
    Completed,
    Error,
}

/// Progress record for a single file within a job.
#[derive(Debug, Clone, Serialize)]
pub struct PerFileRecord {
    pub index: usize,
    pub filename: String,
    pub filepath: String,
    pub status: JobStatus,
    pub progress: f64,
    pub phase: FilePhase,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// A running or terminated ingestion task tracked by the [`crate::jobs::JobRegistry`].
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub message: String,
    pub progress_percent: f64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_files: usize,
    pub files_completed: usize,
    pub current_file: Option<String>,
    pub current_phase: Option<FilePhase>,
    pub estimated_time_remaining: Option<String>,
    pub per_file: Vec<PerFileRecord>,
}
