//! CLI ingestion progress reporting.
//!
//! Reports observable progress while `hre ingest` waits for a background job
//! to finish, so users see which file is being processed, in what phase, and
//! how much is left. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts. Generalized from the teacher's `SyncProgressEvent`/
//! `SyncProgressReporter`/`ProgressMode` trio, re-keyed from a per-connector
//! discover/ingest shape onto the job registry's per-file phase model.

use std::io::Write;
use std::time::Duration;

use crate::models::{Job, JobStatus};

/// A single progress event, derived from a [`Job`] snapshot.
#[derive(Clone, Debug)]
pub struct IngestProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub current_file: Option<String>,
    pub files_completed: usize,
    pub total_files: usize,
    pub estimated_time_remaining: Option<String>,
}

impl IngestProgressEvent {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            current_file: job.current_file.clone(),
            files_completed: job.files_completed,
            total_files: job.total_files,
            estimated_time_remaining: job.estimated_time_remaining.clone(),
        }
    }
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest a1b2c3d4  processing  3 / 10 files  (eta 12s)  report.pdf".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &IngestProgressEvent) {
        let eta = event.estimated_time_remaining.as_deref().unwrap_or("unknown");
        let file = event.current_file.as_deref().unwrap_or("-");
        let line = format!(
            "ingest {}  {:?}  {} / {} files  (eta {})  {}\n",
            event.job_id,
            event.status,
            event.files_completed,
            event.total_files,
            eta,
            file
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &IngestProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "job_id": event.job_id,
            "status": format!("{:?}", event.status).to_lowercase(),
            "current_file": event.current_file,
            "files_completed": event.files_completed,
            "total_files": event.total_files,
            "estimated_time_remaining": event.estimated_time_remaining,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &IngestProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Poll `registry` for `job_id` every 500ms, reporting each snapshot via
/// `reporter`, until the job reaches a terminal status. Used by the CLI's
/// `ingest` command to block and show progress for a job the engine is
/// already running in the background.
pub async fn watch_job(registry: &crate::jobs::JobRegistry, job_id: &str, reporter: &dyn ProgressReporter) -> crate::errors::Result<Job> {
    loop {
        let job = registry.get(job_id).await?;
        reporter.report(&IngestProgressEvent::from_job(&job));
        if matches!(job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled) {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_progress_does_nothing() {
        let event = IngestProgressEvent {
            job_id: "abc".to_string(),
            status: JobStatus::Processing,
            current_file: None,
            files_completed: 0,
            total_files: 1,
            estimated_time_remaining: None,
        };
        NoProgress.report(&event);
    }
}
