//! Repository for the `generation_jobs` table.

use atelier_core::types::{DbId, JobId};
use sqlx::PgPool;

use crate::models::generation_job::{CreateGenerationJob, GenerationJobRow};

/// Column list for generation_jobs queries.
const COLUMNS: &str = "id, job_id, caller, prompt, model, resolution, aspect_ratio, \
    variation_count, variations, outputs, status, error, elapsed_ms, \
    started_at, finished_at, created_at";

/// Insert and lookup of finished generation jobs.
pub struct GenerationJobRepo;

impl GenerationJobRepo {
    /// Insert a finished job, returning its row id.
    pub async fn create(pool: &PgPool, input: &CreateGenerationJob) -> Result<DbId, sqlx::Error> {
        let (id,): (DbId,) = sqlx::query_as(
            "INSERT INTO generation_jobs
                (job_id, caller, prompt, model, resolution, aspect_ratio,
                 variation_count, variations, outputs, status, error,
                 elapsed_ms, started_at, finished_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING id",
        )
        .bind(input.job_id)
        .bind(&input.caller)
        .bind(&input.prompt)
        .bind(&input.model)
        .bind(&input.resolution)
        .bind(&input.aspect_ratio)
        .bind(input.variation_count)
        .bind(&input.variations)
        .bind(&input.outputs)
        .bind(&input.status)
        .bind(&input.error)
        .bind(input.elapsed_ms)
        .bind(input.started_at)
        .bind(input.finished_at)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    /// Find a job by its public job id.
    pub async fn find_by_job_id(
        pool: &PgPool,
        job_id: JobId,
    ) -> Result<Option<GenerationJobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE job_id = $1");
        sqlx::query_as::<_, GenerationJobRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }
}
