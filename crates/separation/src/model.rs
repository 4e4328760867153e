//! ONNX stem-splitting model. The graph takes a stereo waveform shaped
//! `[1, 2, samples]` and returns every stem at once as
//! `[1, stems, 2, samples]`. Long inputs are processed in overlapping
//! chunks and blended back together.

use std::path::Path;

use ndarray::{s, Array2, Array4, Zip};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::SeparationError;
use crate::Result;

pub const MODEL_SAMPLE_RATE: u32 = 44_100;
pub const MODEL_FILENAME: &str = "htdemucs.onnx";
pub const STEMS_FILENAME: &str = "stems.txt";

const DEFAULT_STEMS: [&str; 4] = ["drums", "bass", "other", "vocals"];

// Segment length the graph was exported with (~7.8s at 44.1kHz).
const CHUNK_SAMPLES: usize = 343_980;
const OVERLAP_RATIO: f32 = 0.25;

/// A loaded separation model. Seam for swapping in a fake during tests.
pub trait StemModel: Send {
    /// Stem names in the order the model emits them.
    fn stems(&self) -> &[String];

    fn sample_rate(&self) -> u32;

    /// Splits a `[2, samples]` mixture into one waveform per stem,
    /// each the same shape as the input.
    fn apply(&mut self, mixture: &Array2<f32>) -> Result<Vec<Array2<f32>>>;
}

#[derive(Debug)]
pub struct OnnxStemModel {
    session: Session,
    stems: Vec<String>,
    input_name: String,
    output_name: String,
}

impl OnnxStemModel {
    /// Loads `htdemucs.onnx` from `model_dir`. An optional `stems.txt`
    /// next to it overrides the default stem names.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILENAME);
        if !model_path.exists() {
            return Err(SeparationError::ModelLoad(format!(
                "model file not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| SeparationError::ModelLoad(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| SeparationError::ModelLoad("model has no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| SeparationError::ModelLoad("model has no outputs".into()))?;

        let stems = read_stem_names(model_dir);
        tracing::info!(
            model = %model_path.display(),
            stems = ?stems,
            "separation model loaded"
        );

        Ok(Self {
            session,
            stems,
            input_name,
            output_name,
        })
    }

    fn run_chunk(&mut self, chunk: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        let frames = chunk.shape()[1];
        let shape: Vec<i64> = vec![1, 2, frames as i64];
        let data: Vec<f32> = chunk.iter().copied().collect();

        let value = Value::from_array((shape, data))
            .map_err(|e| SeparationError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(|e| SeparationError::Inference(e.to_string()))?;

        let tensor = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            SeparationError::Inference(format!("model output '{}' missing", self.output_name))
        })?;
        let (out_shape, out_data) = tensor
            .try_extract_tensor::<f32>()
            .map_err(|e| SeparationError::Inference(e.to_string()))?;

        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 4 || dims[0] != 1 || dims[2] != 2 {
            return Err(SeparationError::Inference(format!(
                "unexpected output shape {dims:?}"
            )));
        }

        let stacked = Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), out_data.to_vec())
            .map_err(|e| SeparationError::Inference(e.to_string()))?;
        Ok((0..dims[1])
            .map(|stem| stacked.slice(s![0, stem, .., ..]).to_owned())
            .collect())
    }
}

impl StemModel for OnnxStemModel {
    fn stems(&self) -> &[String] {
        &self.stems
    }

    fn sample_rate(&self) -> u32 {
        MODEL_SAMPLE_RATE
    }

    fn apply(&mut self, mixture: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        let n_stems = self.stems.len();
        apply_chunked(mixture, CHUNK_SAMPLES, n_stems, |chunk| {
            self.run_chunk(chunk)
        })
    }
}

fn read_stem_names(model_dir: &Path) -> Vec<String> {
    let default = || DEFAULT_STEMS.iter().map(|s| s.to_string()).collect();
    let path = model_dir.join(STEMS_FILENAME);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return default();
    };
    let names: Vec<String> = text
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() { default() } else { names }
}

/// Overlap-add driver. Runs `run` on fixed-length windows of `mixture`
/// and blends the per-stem results with a cosine fade so chunk seams
/// are inaudible.
pub(crate) fn apply_chunked<F>(
    mixture: &Array2<f32>,
    chunk_len: usize,
    n_stems: usize,
    mut run: F,
) -> Result<Vec<Array2<f32>>>
where
    F: FnMut(&Array2<f32>) -> Result<Vec<Array2<f32>>>,
{
    let n_channels = mixture.shape()[0];
    let n_samples = mixture.shape()[1];

    if n_samples <= chunk_len {
        let stems = run(mixture)?;
        check_stem_count(&stems, n_stems)?;
        return Ok(stems);
    }

    let hop = (chunk_len as f32 * (1.0 - OVERLAP_RATIO)) as usize;
    let n_chunks = ((n_samples - chunk_len) as f32 / hop as f32).ceil() as usize + 1;
    // The file edges are covered by a single chunk, so fading there
    // would leave the first and last samples with zero weight.
    let first_window = blend_window(chunk_len, false, true);
    let mid_window = blend_window(chunk_len, true, true);
    let last_window = blend_window(chunk_len, true, false);
    tracing::debug!(n_chunks, n_samples, "splitting input into chunks");

    let mut out: Vec<Array2<f32>> = vec![Array2::zeros((n_channels, n_samples)); n_stems];
    let mut weight = Array2::<f32>::zeros((n_channels, n_samples));

    for chunk_idx in 0..n_chunks {
        let start = chunk_idx * hop;
        let end = (start + chunk_len).min(n_samples);
        let size = end - start;
        let window = if chunk_idx == 0 {
            &first_window
        } else if chunk_idx == n_chunks - 1 {
            &last_window
        } else {
            &mid_window
        };

        let mut chunk = Array2::zeros((n_channels, chunk_len));
        chunk
            .slice_mut(s![.., 0..size])
            .assign(&mixture.slice(s![.., start..end]));

        let stems = run(&chunk)?;
        check_stem_count(&stems, n_stems)?;

        for (stem_idx, stem) in stems.iter().enumerate() {
            for ch in 0..n_channels {
                for i in 0..size {
                    // The trailing partial chunk is zero-padded, so it
                    // contributes at full weight instead of fading.
                    let w = if size == chunk_len { window[i] } else { 1.0 };
                    out[stem_idx][[ch, start + i]] += stem[[ch, i]] * w;
                    if stem_idx == 0 {
                        weight[[ch, start + i]] += w;
                    }
                }
            }
        }
    }

    for stem in &mut out {
        Zip::from(stem).and(&weight).for_each(|sample, &w| {
            if w > 0.0 {
                *sample /= w;
            }
        });
    }

    Ok(out)
}

fn check_stem_count(stems: &[Array2<f32>], expected: usize) -> Result<()> {
    if stems.len() == expected {
        Ok(())
    } else {
        Err(SeparationError::Inference(format!(
            "expected {expected} stems, model returned {}",
            stems.len()
        )))
    }
}

fn blend_window(length: usize, fade_in: bool, fade_out: bool) -> Vec<f32> {
    let fade = (length as f32 * OVERLAP_RATIO / 2.0) as usize;
    let mut window = vec![1.0; length];
    for i in 0..fade {
        let t = i as f32 / fade as f32;
        let gain = 0.5 * (1.0 - (std::f32::consts::PI * t).cos());
        if fade_in {
            window[i] = gain;
        }
        if fade_out {
            window[length - 1 - i] = gain;
        }
    }
    window
}
