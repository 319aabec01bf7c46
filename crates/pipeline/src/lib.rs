//! Generation pipeline: fan-out/aggregate orchestration of provider calls
//! with per-job progress streaming.
//!
//! [`orchestrator::Orchestrator`] validates a job, loads its reference
//! images one by one, issues one provider call per variation
//! concurrently, waits for all of them, and reports through a
//! [`progress::ProgressChannel`] that emits exactly one terminal event.
//!
//! External systems are reached through the collaborator traits in
//! [`assets`], [`provider`] and [`recorder`].

pub mod assets;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod provider;
pub mod recorder;
