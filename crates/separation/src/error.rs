use thiserror::Error;

/// Failures across the decode, inference, and encode stages.
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("unsupported audio input: {0}")]
    UnsupportedAudio(String),

    #[error("failed to resample audio: {0}")]
    Resample(String),

    #[error("failed to load separation model: {0}")]
    ModelLoad(String),

    #[error("model inference failed: {0}")]
    Inference(String),

    #[error("model did not produce stem '{0}'")]
    MissingStem(String),

    #[error("failed to encode output audio: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
