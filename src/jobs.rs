//! Job registry (C6): in-memory map of ingestion job identifiers to
//! progress/status records, generalized from `original_source/flexible-graphrag/backend.py`'s
//! `PROCESSING_STATUS` global dict + `_update_processing_status` /
//! `_estimate_processing_time` / `_is_processing_cancelled` free functions
//! into an explicit `JobRegistry` value (SPEC_FULL §4.6/§9). Cancellation
//! token idiom generalized from `other_examples/e31db6db_resolveworks-insight__src-tauri-src-core-jobs-mod.rs.rs`'s
//! `tokio_util::sync::CancellationToken` usage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::errors::{EngineError, Result};
use crate::models::{FilePhase, Job, JobStatus, PerFileRecord};

const JOB_ID_LEN: usize = 8;

fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..JOB_ID_LEN].to_string()
}

/// A cheaply-`Clone`-able cooperative cancellation handle, threaded through
/// every ingestion stage. Stages poll [`CancelToken::is_cancelled`] at the
/// checkpoints named in SPEC_FULL §4.6.
#[derive(Clone)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

/// A patch applied to a [`Job`] via [`JobRegistry::update`]. Every field is
/// optional; `None` leaves the existing value untouched.
#[derive(Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub progress_percent: Option<f64>,
    pub current_file: Option<Option<String>>,
    pub current_phase: Option<Option<FilePhase>>,
    pub files_completed: Option<usize>,
    pub per_file: Option<Vec<PerFileRecord>>,
    pub estimated_time_remaining: Option<Option<String>>,
}

struct Entry {
    job: Job,
    cancel: CancelToken,
    started_instant: std::time::Instant,
}

/// Shape of the input being ingested, used only to compute the initial
/// time-estimate bucket before any file has completed.
pub struct IngestShape {
    pub total_files: usize,
    pub total_bytes: u64,
    pub has_complex_formats: bool,
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Entry>>,
    retention: chrono::Duration,
}

impl JobRegistry {
    pub fn new(retention_hours: u64) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention: chrono::Duration::hours(retention_hours as i64),
        }
    }

    /// Register a new job, returning its id and a cancel token for the
    /// orchestrator to pass through the ingestion pipeline.
    pub async fn create(&self, shape: &IngestShape) -> (String, CancelToken) {
        self.evict_expired().await;

        let id = new_job_id();
        let now = Utc::now();
        let cancel = CancelToken { inner: CancellationToken::new() };
        let job = Job {
            id: id.clone(),
            status: JobStatus::Started,
            message: "Job started".to_string(),
            progress_percent: 0.0,
            started_at: now,
            updated_at: now,
            total_files: shape.total_files,
            files_completed: 0,
            current_file: None,
            current_phase: None,
            estimated_time_remaining: Some(initial_estimate(shape)),
            per_file: Vec::new(),
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(
            id.clone(),
            Entry { job, cancel: cancel.clone(), started_instant: std::time::Instant::now() },
        );
        (id, cancel)
    }

    /// Apply a monotonic patch, recomputing `estimated_time_remaining` from
    /// elapsed-time-per-completed-file once at least one file has finished
    /// (SPEC_FULL §4.6 "Time estimation").
    pub async fn update(&self, job_id: &str, patch: JobPatch) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::NotReady(format!("unknown job {job_id}")))?;

        if let Some(status) = patch.status {
            entry.job.status = status;
        }
        if let Some(message) = patch.message {
            entry.job.message = message;
        }
        if let Some(progress) = patch.progress_percent {
            entry.job.progress_percent = progress;
        }
        if let Some(current_file) = patch.current_file {
            entry.job.current_file = current_file;
        }
        if let Some(current_phase) = patch.current_phase {
            entry.job.current_phase = current_phase;
        }
        if let Some(files_completed) = patch.files_completed {
            entry.job.files_completed = files_completed;
        }
        if let Some(per_file) = patch.per_file {
            entry.job.per_file = per_file;
        }

        if let Some(eta) = patch.estimated_time_remaining {
            entry.job.estimated_time_remaining = eta;
        } else if entry.job.files_completed > 0 && entry.job.files_completed < entry.job.total_files {
            let elapsed = entry.started_instant.elapsed().as_secs_f64();
            let remaining_files = (entry.job.total_files - entry.job.files_completed) as f64;
            let completed_files = entry.job.files_completed as f64;
            let remaining_secs = elapsed * remaining_files / completed_files;
            entry.job.estimated_time_remaining = Some(humanize_seconds(remaining_secs));
        }

        entry.job.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|e| e.job.clone())
            .ok_or_else(|| EngineError::NotReady(format!("unknown job {job_id}")))
    }

    /// Cancel a job that is still `started` or `processing`. No-op (but not
    /// an error) for already-terminal jobs, per SPEC_FULL §6 `cancel_processing`.
    pub async fn cancel(&self, job_id: &str) -> Result<String> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::NotReady(format!("unknown job {job_id}")))?;

        match entry.job.status {
            JobStatus::Started | JobStatus::Processing => {
                entry.cancel.cancel();
                entry.job.status = JobStatus::Cancelled;
                entry.job.message = "Cancelled by user".to_string();
                entry.job.updated_at = Utc::now();
                Ok("cancellation requested".to_string())
            }
            _ => Ok("job already finished, nothing to cancel".to_string()),
        }
    }

    /// A single snapshot for the ~2s-interval event stream; the transport
    /// layer (server.rs) is responsible for ticking and closing on terminal status.
    pub async fn snapshot(&self, job_id: &str) -> Result<Job> {
        self.get(job_id).await
    }

    async fn evict_expired(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, entry| {
            !matches!(entry.job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
                || entry.job.updated_at > cutoff
        });
    }
}

/// Bucketed heuristic estimate from input shape, before any file completes.
fn initial_estimate(shape: &IngestShape) -> String {
    let per_file_secs: f64 = if shape.has_complex_formats { 8.0 } else { 2.0 };
    let bytes_factor = (shape.total_bytes as f64 / (1024.0 * 1024.0)).max(1.0).sqrt();
    let seconds = (shape.total_files.max(1) as f64) * per_file_secs * bytes_factor;
    humanize_seconds(seconds)
}

fn humanize_seconds(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{}s", seconds.round() as u64)
    } else {
        format!("{}m", (seconds / 60.0).round() as u64)
    }
}

pub type SharedRegistry = Arc<JobRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(total_files: usize, total_bytes: u64, complex: bool) -> IngestShape {
        IngestShape { total_files, total_bytes, has_complex_formats: complex }
    }

    #[tokio::test]
    async fn create_returns_a_started_job_with_initial_estimate() {
        let registry = JobRegistry::new(24);
        let (id, _cancel) = registry.create(&shape(3, 1024, false)).await;
        let job = registry.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Started);
        assert!(job.estimated_time_remaining.is_some());
    }

    #[tokio::test]
    async fn job_id_is_eight_hex_characters() {
        let registry = JobRegistry::new(24);
        let (id, _cancel) = registry.create(&shape(1, 10, false)).await;
        assert_eq!(id.len(), JOB_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn update_applies_a_monotonic_patch() {
        let registry = JobRegistry::new(24);
        let (id, _cancel) = registry.create(&shape(2, 10, false)).await;
        registry
            .update(
                &id,
                JobPatch {
                    status: Some(JobStatus::Processing),
                    files_completed: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let job = registry.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.files_completed, 1);
    }

    #[tokio::test]
    async fn update_recomputes_eta_from_elapsed_once_a_file_completes() {
        let registry = JobRegistry::new(24);
        let (id, _cancel) = registry.create(&shape(4, 10, false)).await;
        registry.update(&id, JobPatch { files_completed: Some(1), ..Default::default() }).await.unwrap();
        let job = registry.get(&id).await.unwrap();
        assert!(job.estimated_time_remaining.is_some());
    }

    #[tokio::test]
    async fn cancel_transitions_an_active_job_and_trips_its_token() {
        let registry = JobRegistry::new(24);
        let (id, cancel) = registry.create(&shape(1, 10, false)).await;
        registry.cancel(&id).await.unwrap();
        let job = registry.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_a_no_op_on_a_terminal_job() {
        let registry = JobRegistry::new(24);
        let (id, _cancel) = registry.create(&shape(1, 10, false)).await;
        registry
            .update(&id, JobPatch { status: Some(JobStatus::Completed), ..Default::default() })
            .await
            .unwrap();
        let message = registry.cancel(&id).await.unwrap();
        assert!(message.contains("already finished"));
        let job = registry.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn get_on_unknown_job_is_an_error() {
        let registry = JobRegistry::new(24);
        assert!(registry.get("deadbeef").await.is_err());
    }

    #[test]
    fn humanize_seconds_switches_units_at_a_minute() {
        assert_eq!(humanize_seconds(30.0), "30s");
        assert_eq!(humanize_seconds(90.0), "2m");
    }
}
