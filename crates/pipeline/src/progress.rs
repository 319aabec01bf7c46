//! Per-job progress channel.
//!
//! A [`ProgressChannel`] is the write side of a one-way event stream bound
//! to the single caller that submitted a job. It accepts any number of
//! `progress` events followed by exactly one terminal event (`complete` or
//! `error`), then closes itself by dropping its sender. Writes after the
//! terminal event are refused and logged.

use atelier_core::types::JobId;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffered events per job before the orchestrator waits on the caller.
pub const CHANNEL_CAPACITY: usize = 32;

/// Coarse stage label carried by `progress` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    LoadingReferences,
    Generating,
    Finalizing,
}

/// Payload of a `progress` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub status: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
}

/// Payload of the terminal `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    /// First output, for clients that show a single image.
    pub image_url: String,
    /// All outputs in variation submission order.
    pub image_urls: Vec<String>,
    /// Seconds since submission.
    pub elapsed: f64,
    /// Number of variations requested (after clamping).
    pub variations: u8,
}

/// Payload of the terminal `error` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// One event on a progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Status(StatusPayload),
    Complete(CompletePayload),
    Error(ErrorPayload),
}

impl ProgressEvent {
    /// Event name on the wire (`event:` line of the stream).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "progress",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Status(_))
    }

    /// Event payload as JSON (`data:` line of the stream).
    pub fn data(&self) -> serde_json::Value {
        let value = match self {
            Self::Status(p) => serde_json::to_value(p),
            Self::Complete(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
        };
        value.expect("progress payloads are always serialisable")
    }
}

enum ChannelState {
    Open(mpsc::Sender<ProgressEvent>),
    /// The terminal event was written and the sender dropped.
    Terminated,
    /// The caller went away before the terminal event.
    Detached,
}

/// Write side of a job's event stream.
pub struct ProgressChannel {
    job_id: JobId,
    state: ChannelState,
    cancel: CancellationToken,
}

/// Create a channel for `job_id`.
///
/// `cancel` is fired if the receiver is found to be gone, so the job can
/// stop acting on results nobody will see.
pub fn channel(
    job_id: JobId,
    cancel: CancellationToken,
) -> (ProgressChannel, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let channel = ProgressChannel {
        job_id,
        state: ChannelState::Open(tx),
        cancel,
    };
    (channel, rx)
}

impl ProgressChannel {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Whether no further events can be written.
    pub fn is_closed(&self) -> bool {
        !matches!(self.state, ChannelState::Open(_))
    }

    /// Emit a non-terminal `progress` event.
    pub async fn status(&mut self, stage: Stage, message: impl Into<String>, percent: Option<u8>) -> bool {
        self.emit(ProgressEvent::Status(StatusPayload {
            status: stage,
            message: message.into(),
            percent: percent.map(|p| p.min(100)),
        }))
        .await
    }

    /// Emit the terminal `complete` event and close.
    pub async fn complete(&mut self, payload: CompletePayload) -> bool {
        self.emit(ProgressEvent::Complete(payload)).await
    }

    /// Emit the terminal `error` event and close.
    pub async fn fail(&mut self, error: impl Into<String>) -> bool {
        self.emit(ProgressEvent::Error(ErrorPayload {
            error: error.into(),
        }))
        .await
    }

    /// Write `event`. Returns `false` if it was not delivered.
    async fn emit(&mut self, event: ProgressEvent) -> bool {
        let sender = match &self.state {
            ChannelState::Open(sender) => sender,
            ChannelState::Terminated => {
                tracing::warn!(
                    job_id = %self.job_id,
                    kind = event.kind(),
                    "Dropped progress event written after terminal event",
                );
                return false;
            }
            ChannelState::Detached => return false,
        };

        let terminal = event.is_terminal();
        if sender.send(event).await.is_err() {
            tracing::info!(job_id = %self.job_id, "Progress receiver gone, detaching job");
            self.state = ChannelState::Detached;
            self.cancel.cancel();
            return false;
        }

        if terminal {
            // Dropping the sender ends the caller's stream.
            self.state = ChannelState::Terminated;
        }
        true
    }
}
