use thiserror::Error;
use tokio::sync::mpsc;

use crate::JobRequest;

/// Rejected enqueue attempts hand the request back so the caller can
/// clean up its staged input file.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("job queue is full")]
    Full(JobRequest),
    #[error("job queue is closed")]
    Closed(JobRequest),
}

impl EnqueueError {
    pub fn into_request(self) -> JobRequest {
        match self {
            Self::Full(req) | Self::Closed(req) => req,
        }
    }
}

/// Cheaply cloneable producer side of the bounded job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobRequest>,
}

impl JobQueue {
    pub fn bounded(depth: usize) -> (Self, mpsc::Receiver<JobRequest>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue. A full queue is an immediate error so the
    /// user hears "busy" right away instead of waiting in silence.
    pub fn try_enqueue(&self, request: JobRequest) -> Result<(), EnqueueError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(req) => EnqueueError::Full(req),
            mpsc::error::TrySendError::Closed(req) => EnqueueError::Closed(req),
        })
    }
}
