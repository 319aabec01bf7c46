/// Primary keys of persisted job records (PostgreSQL BIGSERIAL).
pub type DbId = i64;

/// Identifier of a generation job, assigned when the job is created.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
