//! Audio source separation: decode an input file, run a stem-splitting
//! model over it, and render the chosen stem as an MP3.

pub mod audio;
pub mod encode;
pub mod engine;
pub mod error;
pub mod model;
pub mod normalize;
pub mod select;

pub use engine::SeparationEngine;
pub use error::SeparationError;
pub use model::{OnnxStemModel, StemModel, MODEL_SAMPLE_RATE};
pub use select::StemChoice;

pub type Result<T> = std::result::Result<T, SeparationError>;
