pub mod generation_job_repo;

pub use generation_job_repo::GenerationJobRepo;
