//! Row and insert types for the `generation_jobs` table.

use atelier_core::types::{DbId, JobId, Timestamp};
use atelier_pipeline::recorder::JobRecord;
use serde::Serialize;
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A finished generation job row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationJobRow {
    pub id: DbId,
    pub job_id: JobId,
    pub caller: Option<String>,
    pub prompt: String,
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub variation_count: i16,
    /// Per-variation outcomes: `[{status, outputs, error?}]`.
    pub variations: serde_json::Value,
    pub outputs: Vec<String>,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_ms: i64,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for inserting a finished job.
#[derive(Debug, Clone)]
pub struct CreateGenerationJob {
    pub job_id: JobId,
    pub caller: Option<String>,
    pub prompt: String,
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub variation_count: i16,
    pub variations: serde_json::Value,
    pub outputs: Vec<String>,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_ms: i64,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl From<&JobRecord> for CreateGenerationJob {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            caller: record.caller.clone(),
            prompt: record.prompt.clone(),
            model: record.model.clone(),
            resolution: record.resolution.clone(),
            aspect_ratio: record.aspect_ratio.clone(),
            variation_count: i16::from(record.variation_count),
            variations: serde_json::to_value(&record.variations)
                .unwrap_or_else(|_| serde_json::Value::Array(Vec::new())),
            outputs: record.outputs.clone(),
            status: record.status.to_string(),
            error: record.error.clone(),
            elapsed_ms: record.elapsed_ms,
            started_at: record.created_at,
            finished_at: record.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use atelier_pipeline::recorder::VariationRecord;
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_row_carries_variation_outcomes_as_json() {
        let now = chrono::Utc::now();
        let record = JobRecord {
            job_id: uuid::Uuid::nil(),
            caller: None,
            prompt: "a red fox".into(),
            model: "pro".into(),
            resolution: "4K".into(),
            aspect_ratio: "21:9".into(),
            variation_count: 2,
            variations: vec![
                VariationRecord {
                    status: "succeeded",
                    outputs: vec!["https://cdn/1.png".into()],
                    error: None,
                },
                VariationRecord {
                    status: "failed",
                    outputs: vec![],
                    error: Some("timeout".into()),
                },
            ],
            outputs: vec!["https://cdn/1.png".into()],
            status: "completed",
            error: None,
            elapsed_ms: 1200,
            created_at: now,
            finished_at: now,
        };

        let row = CreateGenerationJob::from(&record);
        assert_eq!(row.variation_count, 2);
        assert_eq!(row.status, "completed");
        assert_eq!(
            row.variations,
            json!([
                {"status": "succeeded", "outputs": ["https://cdn/1.png"]},
                {"status": "failed", "outputs": [], "error": "timeout"}
            ])
        );
    }
}
