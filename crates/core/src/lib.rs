//! Domain types and pure logic shared by every Atelier crate.
//!
//! Nothing in this crate performs I/O: it defines the error type, id and
//! timestamp aliases, the generation-job state machine and the constraint
//! validation applied to incoming generation requests.

pub mod error;
pub mod generation;
pub mod job;
pub mod types;
