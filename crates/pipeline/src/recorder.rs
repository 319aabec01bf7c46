//! Persistence of finished jobs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use atelier_core::job::{GenerationJob, VariationResult};
use atelier_core::types::{DbId, JobId, Timestamp};
use serde::Serialize;

/// Outcome of one variation as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationRecord {
    /// `"succeeded"` or `"failed"`.
    pub status: &'static str,
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&VariationResult> for VariationRecord {
    fn from(result: &VariationResult) -> Self {
        match result {
            VariationResult::Outputs(urls) => Self {
                status: "succeeded",
                outputs: urls.clone(),
                error: None,
            },
            VariationResult::Failed(msg) => Self {
                status: "failed",
                outputs: Vec::new(),
                error: Some(msg.clone()),
            },
        }
    }
}

/// Everything stored about a job once its terminal event has been sent.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub caller: Option<String>,
    pub prompt: String,
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub variation_count: u8,
    pub variations: Vec<VariationRecord>,
    pub outputs: Vec<String>,
    /// `"completed"` or `"failed"`.
    pub status: &'static str,
    pub error: Option<String>,
    pub elapsed_ms: i64,
    pub created_at: Timestamp,
    pub finished_at: Timestamp,
}

/// Fields of a [`JobRecord`] not derivable from the job itself.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub caller: Option<String>,
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub created_at: Timestamp,
}

impl JobRecord {
    /// Snapshot a job that reached a terminal state.
    pub fn from_job(job: &GenerationJob, ctx: RecordContext, error: Option<String>) -> Self {
        let finished_at = chrono::Utc::now();
        Self {
            job_id: job.id,
            caller: ctx.caller,
            prompt: job.prompt.clone(),
            model: ctx.model,
            resolution: ctx.resolution,
            aspect_ratio: ctx.aspect_ratio,
            variation_count: job.variation_count,
            variations: job.results().iter().map(VariationRecord::from).collect(),
            outputs: job.outputs(),
            status: job.state().as_str(),
            error,
            elapsed_ms: (finished_at - ctx.created_at).num_milliseconds(),
            created_at: ctx.created_at,
            finished_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to record job: {0}")]
pub struct RecordError(pub String);

/// Stores finished jobs.
#[async_trait]
pub trait JobRecorder: Send + Sync {
    async fn record(&self, record: &JobRecord) -> Result<DbId, RecordError>;
}

/// Jobs kept by [`MemoryJobRecorder::new`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 256;

/// In-process recorder used when no database is configured.
///
/// Keeps the most recent `capacity` records; older ones are evicted. Ids
/// keep counting across evictions.
#[derive(Debug)]
pub struct MemoryJobRecorder {
    capacity: usize,
    inner: Mutex<MemoryRecords>,
}

#[derive(Debug, Default)]
struct MemoryRecords {
    records: VecDeque<JobRecord>,
    last_id: DbId,
}

impl MemoryJobRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(MemoryRecords::default()),
        }
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> Vec<JobRecord> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.records.iter().cloned().collect()
    }
}

impl Default for MemoryJobRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRecorder for MemoryJobRecorder {
    async fn record(&self, record: &JobRecord) -> Result<DbId, RecordError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.records.len() >= self.capacity {
            let _ = inner.records.pop_front();
        }
        inner.records.push_back(record.clone());
        inner.last_id += 1;
        Ok(inner.last_id)
    }
}

#[cfg(test)]
mod tests {
    use atelier_core::job::JobState;

    use super::*;

    fn finished_job() -> GenerationJob {
        let mut job = GenerationJob::new("a red fox".into(), 2, vec![]);
        job.advance(JobState::Validating).unwrap();
        job.advance(JobState::LoadingReferences).unwrap();
        job.advance(JobState::Generating).unwrap();
        job.record_results(vec![
            VariationResult::Outputs(vec!["https://cdn/1.png".into()]),
            VariationResult::Failed("Provider API error (500): oops".into()),
        ])
        .unwrap();
        job.advance(JobState::Completed).unwrap();
        job
    }

    fn context() -> RecordContext {
        RecordContext {
            caller: Some("ada".into()),
            model: "standard".into(),
            resolution: "1K".into(),
            aspect_ratio: "1:1".into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn record_keeps_per_variation_outcomes() {
        let record = JobRecord::from_job(&finished_job(), context(), None);

        assert_eq!(record.status, "completed");
        assert_eq!(record.outputs, vec!["https://cdn/1.png"]);
        assert_eq!(record.variations.len(), 2);
        assert_eq!(record.variations[0].status, "succeeded");
        assert_eq!(record.variations[1].status, "failed");
        assert!(record.variations[1].error.as_deref().unwrap().contains("500"));
        assert!(record.elapsed_ms >= 0);
    }

    #[tokio::test]
    async fn memory_recorder_assigns_sequential_ids() {
        let recorder = MemoryJobRecorder::new();
        let record = JobRecord::from_job(&finished_job(), context(), None);

        assert_eq!(recorder.record(&record).await.unwrap(), 1);
        assert_eq!(recorder.record(&record).await.unwrap(), 2);
        assert_eq!(recorder.records().len(), 2);
    }

    #[tokio::test]
    async fn memory_recorder_evicts_oldest_beyond_capacity() {
        let recorder = MemoryJobRecorder::with_capacity(2);
        let mut last_id = 0;
        for prompt in ["first", "second", "third"] {
            let mut record = JobRecord::from_job(&finished_job(), context(), None);
            record.prompt = prompt.into();
            last_id = recorder.record(&record).await.unwrap();
        }

        assert_eq!(last_id, 3);
        let prompts: Vec<String> = recorder.records().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["second", "third"]);
    }
}
