//! [`JobRecorder`] backed by the `generation_jobs` table.

use async_trait::async_trait;
use atelier_core::types::DbId;
use atelier_pipeline::recorder::{JobRecord, JobRecorder, RecordError};

use crate::models::generation_job::CreateGenerationJob;
use crate::repositories::GenerationJobRepo;
use crate::DbPool;

pub struct PgJobRecorder {
    pool: DbPool,
}

impl PgJobRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRecorder for PgJobRecorder {
    async fn record(&self, record: &JobRecord) -> Result<DbId, RecordError> {
        let input = CreateGenerationJob::from(record);
        GenerationJobRepo::create(&self.pool, &input)
            .await
            .map_err(|e| RecordError(e.to_string()))
    }
}
