//! Ingestion pipeline orchestrator (ties together C1-C6): connector scan →
//! convert → chunk → enrich → (vector write ∥ graph write) → full-text write
//! → persist, with cancellation checks and job progress reporting at every
//! stage boundary (SPEC_FULL §4.3 "Scheduling", §5).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::chunk::chunk_text;
use crate::composer::ComposerHandles;
use crate::config::Config;
use crate::connectors::Connector;
use crate::engine::Engine;
use crate::enrich::{DefaultEnricher, Enricher};
use crate::errors::{EngineError, Result};
use crate::extract::convert_document;
use crate::jobs::{CancelToken, IngestShape, JobPatch};
use crate::models::{ConversionMethod, Document, FilePhase, JobStatus, PerFileRecord, SourceItem};
use crate::stores::ChunkMetadata;

/// Run one ingestion job to completion against `engine`, reporting progress
/// via `engine.registry` under `job_id`. Intended to be spawned with
/// `tokio::spawn` so the caller (CLI or HTTP handler) can return immediately.
pub async fn run_ingestion(engine: Arc<Engine>, job_id: String, cancel: CancelToken, items: Vec<SourceItem>) {
    let result = run_ingestion_inner(&engine, &job_id, &cancel, items).await;

    match result {
        Ok(()) => {
            let _ = engine
                .registry
                .update(
                    &job_id,
                    JobPatch {
                        status: Some(JobStatus::Completed),
                        message: Some("Ingestion completed".to_string()),
                        progress_percent: Some(100.0),
                        ..Default::default()
                    },
                )
                .await;
            if let Err(e) = engine.rebuild_composer().await {
                tracing::warn!(error = %e, "composer rebuild after ingestion failed");
            }
        }
        Err(e) if e.is_cancellation() => {
            tracing::info!(job_id, "ingestion cancelled");
        }
        Err(e) => {
            let _ = engine
                .registry
                .update(
                    &job_id,
                    JobPatch {
                        status: Some(JobStatus::Failed),
                        message: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await;
        }
    }
}

async fn run_ingestion_inner(engine: &Arc<Engine>, job_id: &str, cancel: &CancelToken, items: Vec<SourceItem>) -> Result<()> {
    let _guard = engine.ingest_lock.lock().await;

    engine
        .registry
        .update(job_id, JobPatch { status: Some(JobStatus::Processing), ..Default::default() })
        .await?;

    let total = items.len();
    let mut per_file = Vec::with_capacity(total);
    let mut completed = 0usize;

    for (index, item) in items.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled("ingestion cancelled by user".to_string()));
        }

        let started_at = Utc::now();
        let mut record = PerFileRecord {
            index,
            filename: item.display_name.clone(),
            filepath: item.source_id.clone(),
            status: JobStatus::Processing,
            progress: 0.0,
            phase: FilePhase::Docling,
            message: None,
            started_at: Some(started_at),
            completed_at: None,
            error: None,
        };

        match process_one_item(engine, job_id, &item, cancel, &mut record).await {
            Ok(()) => {
                record.status = JobStatus::Completed;
                record.phase = FilePhase::Completed;
                record.progress = 1.0;
                record.completed_at = Some(Utc::now());
                completed += 1;
            }
            Err(e) if e.is_cancellation() => {
                record.status = JobStatus::Cancelled;
                record.error = Some(e.to_string());
                per_file.push(record);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(file = %item.display_name, error = %e, "ingestion of one file failed, continuing");
                record.status = JobStatus::Failed;
                record.phase = FilePhase::Error;
                record.error = Some(e.to_string());
                record.completed_at = Some(Utc::now());
            }
        }

        per_file.push(record.clone());

        engine
            .registry
            .update(
                job_id,
                JobPatch {
                    files_completed: Some(completed),
                    per_file: Some(per_file.clone()),
                    current_file: Some(Some(item.display_name.clone())),
                    progress_percent: Some(100.0 * (index + 1) as f64 / total.max(1) as f64),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok(())
}

async fn process_one_item(
    engine: &Arc<Engine>,
    job_id: &str,
    item: &SourceItem,
    cancel: &CancelToken,
    record: &mut PerFileRecord,
) -> Result<()> {
    let timeouts = &engine.config.timeouts;

    record.phase = FilePhase::Docling;
    report_phase(engine, job_id, item, record.phase).await;

    let bytes = item.bytes.clone();
    let mime = item.mime.clone();
    let convert_handle = tokio::task::spawn_blocking(move || convert_document(&bytes, &mime));
    let (text, method) = run_with_deadline(
        async { convert_handle.await.map_err(|e| EngineError::Bug(format!("conversion task panicked: {e}"))) },
        cancel,
        Duration::from_secs_f64(timeouts.docling_cancel_check_interval_secs.max(0.01)),
        Duration::from_secs(timeouts.docling_timeout_secs),
        "document conversion",
    )
    .await?
    .map_err(|e| EngineError::BackendIO(format!("conversion failed: {e}")))?;

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled("cancelled before chunking".to_string()));
    }

    let document = build_document(item, &text, method);
    persist_document(&engine.pool, &document).await?;

    record.phase = FilePhase::Chunking;
    report_phase(engine, job_id, item, record.phase).await;
    let mut chunks = chunk_text(&document.id, &document.text, engine.config.chunking.chunk_size, engine.config.chunking.chunk_overlap);
    DefaultEnricher::new(&engine.config.chunking).enrich(&mut chunks);

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled("cancelled before embedding".to_string()));
    }

    let composer = engine.composer.read().await;
    let handles = composer_handles(&composer)?;
    let needs_vectors = handles.vector.is_some() || handles.opensearch_hybrid.is_some();

    if needs_vectors {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = handles
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(|e| EngineError::ModelIO(e.to_string()))?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
    }

    record.phase = FilePhase::KgExtraction;
    report_phase(engine, job_id, item, record.phase).await;
    let schema = kuzu_default_schema_or_active(&engine.config);
    let all_triples = if engine.config.graph.enable_knowledge_graph && handles.graph.is_some() {
        run_with_deadline(
            extract_triples_for_chunks(&chunks, schema.as_ref(), &engine.config, cancel),
            cancel,
            Duration::from_secs_f64(timeouts.kg_cancel_check_interval_secs.max(0.01)),
            Duration::from_secs(timeouts.kg_extraction_timeout_secs),
            "knowledge-graph extraction",
        )
        .await?
    } else {
        Vec::new()
    };

    record.phase = FilePhase::Indexing;
    report_phase(engine, job_id, item, record.phase).await;
    let metadata = ChunkMetadata {
        document_id: document.id.clone(),
        source: document.source.clone(),
        file_name: document.file_name.clone(),
        file_type: document.file_type.clone(),
    };

    write_vector_and_graph(&handles, &chunks, &all_triples, &metadata).await?;

    let fulltext_writer = handles.fulltext.clone().or_else(|| {
        handles.opensearch_hybrid.clone().map(|s| {
            let f: Arc<dyn crate::stores::FullTextStore> = s;
            f
        })
    });
    if let Some(fulltext) = fulltext_writer {
        for chunk in &chunks {
            fulltext.index(&chunk.id, &chunk.text, &metadata).await?;
        }
    }

    persist_chunks(&engine.pool, &chunks).await?;

    Ok(())
}

fn composer_handles(composer: &crate::composer::Composer) -> Result<&ComposerHandles> {
    composer.handles_for_ingestion()
}

/// Streams a per-file phase transition to the registry as it happens, so a
/// client polling `processing_events` observes every phase, not just the
/// file's final state (SPEC_FULL §4.6).
async fn report_phase(engine: &Arc<Engine>, job_id: &str, item: &SourceItem, phase: FilePhase) {
    let _ = engine
        .registry
        .update(
            job_id,
            JobPatch {
                current_file: Some(Some(item.display_name.clone())),
                current_phase: Some(Some(phase)),
                ..Default::default()
            },
        )
        .await;
}

/// Drives `fut` to completion, checking `cancel` and a hard wall-clock
/// deadline every `check_interval` (SPEC_FULL §4.2 "Cancellation", §5
/// "Cancellation and timeout"). The in-flight work itself is not aborted on
/// timeout or cancellation, only abandoned — callers that spawned a
/// blocking task accept that it may keep running to completion off to the
/// side.
async fn run_with_deadline<F, T>(
    fut: F,
    cancel: &CancelToken,
    check_interval: Duration,
    hard_timeout: Duration,
    stage: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::pin!(fut);
    let deadline = tokio::time::Instant::now() + hard_timeout;

    loop {
        tokio::select! {
            res = &mut fut => return res,
            _ = tokio::time::sleep(check_interval) => {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled(format!("cancelled during {stage}")));
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(EngineError::Timeout(format!(
                        "Processing timeout – {stage} took too long; try increasing timeout or using smaller documents."
                    )));
                }
            }
        }
    }
}

/// Extracts triples chunk-by-chunk, checking `cancel` before each LLM call;
/// wrapped by the caller in [`run_with_deadline`] for the stage-wide hard
/// timeout.
async fn extract_triples_for_chunks(
    chunks: &[crate::models::Chunk],
    schema: Option<&crate::config::NamedSchema>,
    config: &Config,
    cancel: &CancelToken,
) -> Result<Vec<crate::models::Triple>> {
    let mut all_triples = Vec::new();
    for chunk in chunks {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled("cancelled during graph extraction".to_string()));
        }
        let triples = crate::graph_extract::extract_triples(
            &chunk.id,
            &chunk.text,
            schema,
            config.chunking.max_triplets_per_chunk,
            &config.llm,
        )
        .await?;
        all_triples.extend(triples);
    }
    Ok(all_triples)
}

async fn write_vector_and_graph(
    handles: &ComposerHandles,
    chunks: &[crate::models::Chunk],
    triples: &[crate::models::Triple],
    metadata: &ChunkMetadata,
) -> Result<()> {
    let vector_writer = handles.vector.clone().or_else(|| {
        handles.opensearch_hybrid.clone().map(|s| {
            let v: Arc<dyn crate::stores::VectorStore> = s;
            v
        })
    });

    let vector_fut = async {
        if let Some(vector) = vector_writer {
            for chunk in chunks {
                if let Some(embedding) = &chunk.embedding {
                    vector.upsert(&chunk.id, embedding, &chunk.text, metadata).await?;
                }
            }
        }
        Ok::<(), EngineError>(())
    };

    let graph_fut = async {
        if let Some(graph) = &handles.graph {
            if !triples.is_empty() {
                graph.upsert_triples(triples, metadata).await?;
            }
        }
        Ok::<(), EngineError>(())
    };

    let (vector_result, graph_result) = tokio::join!(vector_fut, graph_fut);
    vector_result?;
    graph_result?;
    Ok(())
}

fn kuzu_default_schema_or_active(config: &Config) -> Option<crate::config::NamedSchema> {
    if let Some(active) = config.graph.active_schema() {
        return Some(active.clone());
    }
    if config.backends.graph == crate::config::GraphBackend::Kuzu {
        return Some(crate::config::NamedSchema {
            name: "kuzu-default".to_string(),
            entities: vec!["Entity".to_string(), "Chunk".to_string()],
            relations: Vec::new(),
            relationships: Vec::new(),
            strict: false,
        });
    }
    None
}

fn build_document(item: &SourceItem, text: &str, method: ConversionMethod) -> Document {
    let id = uuid::Uuid::new_v4().to_string();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    Document {
        id,
        source: item.source_id.clone(),
        file_name: item.display_name.clone(),
        file_type: item.mime.clone(),
        conversion_method: method,
        text: text.to_string(),
        dedup_hash,
        updated_at: item.updated_at.unwrap_or_else(Utc::now),
    }
}

async fn persist_document(pool: &sqlx::SqlitePool, document: &Document) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents (id, source, file_name, file_type, conversion_method, text, dedup_hash, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(source, file_name) DO UPDATE SET \
         file_type = excluded.file_type, conversion_method = excluded.conversion_method, \
         text = excluded.text, dedup_hash = excluded.dedup_hash, updated_at = excluded.updated_at",
    )
    .bind(&document.id)
    .bind(&document.source)
    .bind(&document.file_name)
    .bind(&document.file_type)
    .bind(document.conversion_method.as_str())
    .bind(&document.text)
    .bind(&document.dedup_hash)
    .bind(document.updated_at.timestamp())
    .execute(pool)
    .await
    .map_err(|e| EngineError::BackendIO(format!("document persist failed: {e}")))?;
    Ok(())
}

async fn persist_chunks(pool: &sqlx::SqlitePool, chunks: &[crate::models::Chunk]) -> Result<()> {
    for chunk in chunks {
        let keywords = serde_json::to_string(&chunk.keywords).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO chunks (id, document_id, position, text, keywords, rolling_summary) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(document_id, position) DO UPDATE SET \
             text = excluded.text, keywords = excluded.keywords, rolling_summary = excluded.rolling_summary",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.position as i64)
        .bind(&chunk.text)
        .bind(keywords)
        .bind(&chunk.rolling_summary)
        .execute(pool)
        .await
        .map_err(|e| EngineError::BackendIO(format!("chunk persist failed: {e}")))?;
    }
    Ok(())
}

/// Build an [`IngestShape`] from already-fetched items for the registry's
/// initial time estimate.
pub fn shape_of(items: &[SourceItem]) -> IngestShape {
    let total_bytes = items.iter().map(|i| i.bytes.len() as u64).sum();
    let has_complex_formats = items.iter().any(|i| {
        matches!(
            i.mime.as_str(),
            crate::extract::MIME_PDF | crate::extract::MIME_DOCX | crate::extract::MIME_PPTX | crate::extract::MIME_XLSX
        )
    });
    IngestShape { total_files: items.len(), total_bytes, has_complex_formats }
}

/// Entry point used by the CLI and HTTP handlers: scans the configured
/// connector then spawns the ingestion as a background task, returning the
/// job id immediately (SPEC_FULL §6 `ingest`).
pub async fn start_ingestion(engine: Arc<Engine>) -> Result<String> {
    let connector: Box<dyn Connector> = engine.connector()?;
    let items = connector
        .scan()
        .await
        .map_err(|e| EngineError::BackendIO(format!("source enumeration failed: {e}")))?;
    start_ingestion_with_items(engine, items).await
}

/// As [`start_ingestion`], but for a caller-supplied set of items (used by
/// `ingest_text`'s single synthetic document, and by tests).
pub async fn start_ingestion_with_items(engine: Arc<Engine>, items: Vec<SourceItem>) -> Result<String> {
    let shape = shape_of(&items);
    let (job_id, cancel) = engine.registry.create(&shape).await;

    let engine_clone = engine.clone();
    let job_id_clone = job_id.clone();
    tokio::spawn(async move {
        run_ingestion(engine_clone, job_id_clone, cancel, items).await;
    });

    Ok(job_id)
}

/// Build a single synthetic [`SourceItem`] for `ingest_text` (SPEC_FULL §6).
pub fn synthetic_text_item(content: &str, source_name: Option<&str>) -> SourceItem {
    let name = source_name.unwrap_or("pasted-text").to_string();
    SourceItem {
        display_name: format!("{name}.txt"),
        source_id: format!("upload://{name}"),
        mime: crate::extract::MIME_TEXT.to_string(),
        bytes: content.as_bytes().to_vec(),
        updated_at: Some(Utc::now()),
    }
}
