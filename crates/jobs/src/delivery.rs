use std::path::Path;

use async_trait::async_trait;
use stemsplit_separation::{SeparationError, StemChoice};

/// Why a job failed, coarse enough to map onto a user-facing message
/// without leaking internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The upload could not be decoded as audio.
    InvalidAudio,
    /// The separation model is missing or failed to load.
    ModelUnavailable,
    /// The job exceeded the processing deadline.
    Timeout,
    /// Anything else: inference, encoding, I/O.
    Internal,
}

impl FailureKind {
    pub fn classify(err: &SeparationError) -> Self {
        match err {
            SeparationError::Decode(_)
            | SeparationError::UnsupportedAudio(_)
            | SeparationError::Resample(_) => Self::InvalidAudio,
            SeparationError::ModelLoad(_) => Self::ModelUnavailable,
            SeparationError::Inference(_)
            | SeparationError::MissingStem(_)
            | SeparationError::Encode(_)
            | SeparationError::Io(_) => Self::Internal,
        }
    }
}

/// Hands finished jobs back to the user. Implemented by the transport
/// layer; the worker never talks to Telegram directly.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends the separated stem to the chat. The file still exists when
    /// this is called; the runner deletes it afterwards.
    async fn deliver(
        &self,
        chat_id: i64,
        output: &Path,
        choice: StemChoice,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Tells the chat the job failed. `detail` is the internal error
    /// text, for operator notification only.
    async fn fail(&self, chat_id: i64, kind: FailureKind, detail: &str);
}
