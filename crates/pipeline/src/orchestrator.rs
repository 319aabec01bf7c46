//! Generation job orchestration.
//!
//! [`Orchestrator::submit`] validates synchronously and then runs the job
//! on its own task:
//!
//! 1. references are resolved and prepared one at a time, in order;
//! 2. one provider call per variation is spawned, all at once;
//! 3. every call is awaited (no early exit), results are slotted back into
//!    submission order;
//! 4. exactly one terminal event is written, then the job is recorded.
//!
//! Cancelling the job's token stops the orchestrator at the next stage
//! boundary or while waiting on provider calls. Spawned calls are detached
//! and run to completion; their results are dropped.

use std::sync::Arc;

use atelier_core::generation::{validate_job, JobInput, ValidatedJob};
use atelier_core::job::{GenerationJob, JobState, VariationResult};
use atelier_core::types::JobId;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::assets::{prepare_reference, AssetStore};
use crate::error::{AssetError, OrchestratorError};
use crate::progress::{self, CompletePayload, ProgressChannel, ProgressEvent, Stage};
use crate::provider::{GenerationProvider, ProviderRequest};
use crate::recorder::{JobRecord, JobRecorder, RecordContext};

/// Caller's side of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    /// Progress events; ends after the terminal event.
    pub events: mpsc::Receiver<ProgressEvent>,
    /// Cancel to abandon the job (e.g. the caller disconnected).
    pub cancel: CancellationToken,
}

/// Runs generation jobs against its collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn GenerationProvider>,
    assets: Arc<dyn AssetStore>,
    recorder: Arc<dyn JobRecorder>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        assets: Arc<dyn AssetStore>,
        recorder: Arc<dyn JobRecorder>,
    ) -> Self {
        Self {
            provider,
            assets,
            recorder,
        }
    }

    /// Validate `input` and start the job.
    ///
    /// Validation errors are returned before anything is spawned or
    /// allocated. Must be called from within a Tokio runtime.
    pub fn submit(&self, input: &JobInput, caller: Option<String>) -> Result<JobHandle, OrchestratorError> {
        let validated = validate_job(input)?;
        let job = GenerationJob::new(
            validated.prompt.clone(),
            validated.variation_count,
            validated.references.clone(),
        );
        let job_id = job.id;

        if validated.dropped_references > 0 {
            tracing::warn!(
                job_id = %job_id,
                dropped = validated.dropped_references,
                model = validated.constraints.model,
                "Reference images beyond the model limit were dropped",
            );
        }
        tracing::info!(
            job_id = %job_id,
            caller = caller.as_deref().unwrap_or("-"),
            model = validated.constraints.model,
            resolution = validated.constraints.resolution.as_str(),
            variations = validated.variation_count,
            references = validated.references.len(),
            "Generation job submitted",
        );

        let cancel = CancellationToken::new();
        let (channel, events) = progress::channel(job_id, cancel.clone());

        let ctx = RecordContext {
            caller,
            model: validated.constraints.model.to_string(),
            resolution: validated.constraints.resolution.as_str().to_string(),
            aspect_ratio: validated.constraints.aspect_ratio.clone(),
            created_at: chrono::Utc::now(),
        };

        let run = JobRun {
            orchestrator: self.clone(),
            job,
            validated,
            ctx,
            channel,
            cancel: cancel.clone(),
            started: Instant::now(),
        };
        tokio::spawn(run.run());

        Ok(JobHandle {
            job_id,
            events,
            cancel,
        })
    }
}

/// How a job run ended without an error.
enum Settled {
    Completed,
    Cancelled,
}

/// State owned by one job's task.
struct JobRun {
    orchestrator: Orchestrator,
    job: GenerationJob,
    validated: ValidatedJob,
    ctx: RecordContext,
    channel: ProgressChannel,
    cancel: CancellationToken,
    started: Instant,
}

impl JobRun {
    async fn run(mut self) {
        let job_id = self.job.id;

        let error = match self.execute().await {
            Ok(Settled::Cancelled) => {
                tracing::info!(job_id = %job_id, state = self.job.state().as_str(), "Generation job cancelled");
                return;
            }
            Ok(Settled::Completed) => None,
            Err(e) if self.cancel.is_cancelled() => {
                tracing::info!(job_id = %job_id, error = %e, "Generation job cancelled before failing");
                return;
            }
            Err(e) => {
                if !self.job.state().is_terminal() {
                    // Failed is reachable from every non-terminal state.
                    let _ = self.job.advance(JobState::Failed);
                }
                tracing::warn!(job_id = %job_id, error = %e, "Generation job failed");
                self.channel.fail(e.to_string()).await;
                Some(e.to_string())
            }
        };

        let record = JobRecord::from_job(&self.job, self.ctx.clone(), error);
        match self.orchestrator.recorder.record(&record).await {
            Ok(id) => tracing::debug!(job_id = %job_id, record_id = id, "Generation job recorded"),
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to record generation job"),
        }
    }

    async fn execute(&mut self) -> Result<Settled, OrchestratorError> {
        self.transition(JobState::Validating)?;
        self.channel
            .status(Stage::Validating, "Request validated", Some(5))
            .await;

        self.transition(JobState::LoadingReferences)?;
        let Some(references) = self.load_references().await? else {
            return Ok(Settled::Cancelled);
        };

        if self.cancel.is_cancelled() {
            return Ok(Settled::Cancelled);
        }
        self.transition(JobState::Generating)?;
        let Some(results) = self.fan_out(&references).await else {
            return Ok(Settled::Cancelled);
        };

        self.aggregate(results).await
    }

    /// Resolve and prepare every reference in order, one status event each.
    ///
    /// `None` if the job was cancelled part way.
    async fn load_references(&mut self) -> Result<Option<Vec<String>>, OrchestratorError> {
        let total = self.validated.references.len();
        let mut prepared = Vec::with_capacity(total);

        for index in 0..total {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let reference = &self.validated.references[index];
            let data_url = self
                .load_reference(reference)
                .await
                .map_err(|source| OrchestratorError::Reference { index, source })?;
            prepared.push(data_url);

            let percent = 10 + 30 * (index + 1) / total;
            self.channel
                .status(
                    Stage::LoadingReferences,
                    format!("Loaded reference {}/{}", index + 1, total),
                    Some(percent as u8),
                )
                .await;
        }

        Ok(Some(prepared))
    }

    async fn load_reference(&self, reference: &str) -> Result<String, AssetError> {
        let asset = self.orchestrator.assets.resolve(reference).await?;
        prepare_reference(asset).await
    }

    /// Spawn one provider call per variation and wait for all of them.
    ///
    /// Returns results in submission order, or `None` if cancelled while
    /// waiting. Cancellation detaches the spawned calls.
    async fn fan_out(&mut self, references: &[String]) -> Option<Vec<VariationResult>> {
        let job_id = self.job.id;
        let count = usize::from(self.validated.variation_count);

        self.channel
            .status(
                Stage::Generating,
                format!("Generating {count} variation(s)"),
                Some(50),
            )
            .await;

        let mut pending = FuturesUnordered::new();
        for index in 0..count {
            let request = ProviderRequest::for_variation(&self.validated, references, index);
            let provider = Arc::clone(&self.orchestrator.provider);
            let handle = tokio::spawn(async move { provider.generate(&request).await });
            pending.push(async move { (index, handle.await) });
        }

        let mut slots: Vec<Option<VariationResult>> = vec![None; count];
        let mut settled = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                next = pending.next() => next,
            };
            let Some((index, joined)) = next else { break };

            let result = match joined {
                Ok(Ok(urls)) => {
                    tracing::debug!(job_id = %job_id, variation = index, outputs = urls.len(), "Variation settled");
                    VariationResult::Outputs(urls)
                }
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job_id, variation = index, error = %e, "Variation failed");
                    VariationResult::Failed(e.to_string())
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, variation = index, error = %e, "Variation task aborted");
                    VariationResult::Failed(format!("Variation task aborted: {e}"))
                }
            };
            slots[index] = Some(result);
            settled += 1;

            let percent = 50 + 45 * settled / count;
            self.channel
                .status(
                    Stage::Generating,
                    format!("Variation {settled}/{count} finished"),
                    Some(percent as u8),
                )
                .await;
        }

        Some(
            slots
                .into_iter()
                .map(|slot| slot.unwrap_or_else(|| VariationResult::Failed("Variation never settled".into())))
                .collect(),
        )
    }

    async fn aggregate(&mut self, results: Vec<VariationResult>) -> Result<Settled, OrchestratorError> {
        self.job
            .record_results(results)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        if !self.job.has_output() {
            let reason = self
                .job
                .results()
                .iter()
                .find_map(|r| match r {
                    VariationResult::Failed(msg) => Some(msg.clone()),
                    VariationResult::Outputs(_) => None,
                })
                .unwrap_or_else(|| "Provider returned no images".to_string());
            return Err(OrchestratorError::AggregateFailure {
                variations: self.job.variation_count,
                reason,
            });
        }

        let unproductive = self.job.unproductive_variations();
        if unproductive > 0 {
            tracing::warn!(
                job_id = %self.job.id,
                unproductive,
                variations = self.job.variation_count,
                "Some variations produced no output",
            );
        }

        self.transition(JobState::Completed)?;
        self.channel
            .status(Stage::Finalizing, "Finalizing", Some(100))
            .await;

        let image_urls = self.job.outputs();
        let elapsed = (self.started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        tracing::info!(
            job_id = %self.job.id,
            outputs = image_urls.len(),
            elapsed_secs = elapsed,
            "Generation job completed",
        );
        self.channel
            .complete(CompletePayload {
                image_url: image_urls.first().cloned().unwrap_or_default(),
                image_urls,
                elapsed,
                variations: self.job.variation_count,
            })
            .await;

        Ok(Settled::Completed)
    }

    fn transition(&mut self, next: JobState) -> Result<(), OrchestratorError> {
        self.job.advance(next).map_err(|e| {
            tracing::error!(job_id = %self.job.id, error = %e, "Illegal job transition");
            OrchestratorError::Internal(e.to_string())
        })
    }
}
