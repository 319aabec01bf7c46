//! Generation job lifecycle.
//!
//! A job moves through a closed set of states:
//!
//! ```text
//! Created -> Validating -> LoadingReferences -> Generating -> Completed
//!                                                          \-> Failed
//! ```
//!
//! Any non-terminal state may also move straight to `Failed`. `Completed`
//! and `Failed` are terminal; nothing leaves them.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::JobId;

/// Lifecycle state of a [`GenerationJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Validating,
    LoadingReferences,
    Generating,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::LoadingReferences => "loading_references",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` belongs to the transition set.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Created, Validating)
            | (Validating, LoadingReferences)
            | (LoadingReferences, Generating)
            | (Generating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Outcome of one variation (one provider call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariationResult {
    /// The call succeeded; zero or more output image URLs, in provider order.
    Outputs(Vec<String>),
    /// The call failed with the given message.
    Failed(String),
}

impl VariationResult {
    pub fn outputs(&self) -> &[String] {
        match self {
            Self::Outputs(urls) => urls,
            Self::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One generation job and its per-variation results.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: JobId,
    pub prompt: String,
    pub variation_count: u8,
    pub references: Vec<String>,
    results: Vec<VariationResult>,
    state: JobState,
}

impl GenerationJob {
    /// Create a job in the `Created` state with a fresh id.
    pub fn new(prompt: String, variation_count: u8, references: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            prompt,
            variation_count,
            references,
            results: Vec::new(),
            state: JobState::Created,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn results(&self) -> &[VariationResult] {
        &self.results
    }

    /// Move to `next`, rejecting transitions outside the closed set.
    pub fn advance(&mut self, next: JobState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::Internal(format!(
                "Illegal job transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Store the aggregated per-variation results.
    ///
    /// Requires exactly `variation_count` entries, in submission order.
    pub fn record_results(&mut self, results: Vec<VariationResult>) -> Result<(), CoreError> {
        if results.len() != usize::from(self.variation_count) {
            return Err(CoreError::Internal(format!(
                "Expected {} variation results, got {}",
                self.variation_count,
                results.len()
            )));
        }
        self.results = results;
        Ok(())
    }

    /// All outputs flattened in submission order.
    pub fn outputs(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.outputs().iter().cloned())
            .collect()
    }

    pub fn has_output(&self) -> bool {
        self.results.iter().any(|r| !r.outputs().is_empty())
    }

    /// Variations that failed or produced nothing.
    pub fn unproductive_variations(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outputs().is_empty())
            .count()
    }
}
