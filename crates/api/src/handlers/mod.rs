pub mod bridge;
pub mod generation;
