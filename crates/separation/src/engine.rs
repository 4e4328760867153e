//! End-to-end pipeline: decode, normalize, split, select, and encode.

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::audio;
use crate::encode;
use crate::error::SeparationError;
use crate::model::{OnnxStemModel, StemModel};
use crate::normalize::Normalization;
use crate::select::{select_stem, StemChoice};
use crate::Result;

/// Runs the whole separation pipeline for one input file. Stateless
/// apart from its settings; the model is loaded fresh per call so a
/// crashed inference never poisons later jobs.
#[derive(Debug, Clone)]
pub struct SeparationEngine {
    model_dir: PathBuf,
    bitrate_kbps: u32,
}

impl SeparationEngine {
    pub fn new(model_dir: PathBuf, bitrate_kbps: u32) -> Self {
        Self {
            model_dir,
            bitrate_kbps,
        }
    }

    /// Separates `input` and writes the chosen stem as an MP3 inside
    /// `out_dir`. Returns the output path; the caller owns its cleanup.
    pub fn separate_file(
        &self,
        input: &Path,
        choice: StemChoice,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let mut model = OnnxStemModel::load(&self.model_dir)?;
        self.separate_with_model(&mut model, input, choice, out_dir)
    }

    /// Same as [`separate_file`](Self::separate_file) but with an
    /// injected model.
    pub fn separate_with_model(
        &self,
        model: &mut dyn StemModel,
        input: &Path,
        choice: StemChoice,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let mixture = audio::decode_to_stereo(input, model.sample_rate())?;
        tracing::debug!(
            samples = mixture.shape()[1],
            %choice,
            "input decoded, starting separation"
        );

        let output = separate_waveform(model, &mixture, choice)?;

        let wav_tmp = tempfile::Builder::new()
            .prefix("stem-")
            .suffix(".wav")
            .tempfile_in(out_dir)?;
        encode::write_wav(wav_tmp.path(), &output, model.sample_rate())?;

        let out_path = tempfile::Builder::new()
            .prefix("stem-")
            .suffix(".mp3")
            .tempfile_in(out_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| SeparationError::Encode(e.to_string()))?;
        if let Err(e) = encode::encode_mp3(wav_tmp.path(), &out_path, self.bitrate_kbps) {
            let _ = std::fs::remove_file(&out_path);
            return Err(e);
        }

        Ok(out_path)
    }
}

/// Normalizes the mixture, runs the model, denormalizes every stem, and
/// selects the requested output.
pub fn separate_waveform(
    model: &mut dyn StemModel,
    mixture: &Array2<f32>,
    choice: StemChoice,
) -> Result<Array2<f32>> {
    let norm = Normalization::measure(mixture);
    let normalized = norm.apply(mixture);

    let mut stems = model.apply(&normalized)?;
    for stem in &mut stems {
        norm.invert_in_place(stem);
    }

    select_stem(model.stems(), stems, choice)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Splits the mixture in half: "vocals" gets 30% of the signal,
    /// "other" gets the remaining 70%.
    struct HalfSplitModel {
        stems: Vec<String>,
    }

    impl HalfSplitModel {
        fn new() -> Self {
            Self {
                stems: vec!["other".into(), "vocals".into()],
            }
        }
    }

    impl StemModel for HalfSplitModel {
        fn stems(&self) -> &[String] {
            &self.stems
        }

        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn apply(&mut self, mixture: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
            Ok(vec![mixture.mapv(|v| v * 0.7), mixture.mapv(|v| v * 0.3)])
        }
    }

    #[test]
    fn stems_sum_back_to_the_mixture() {
        let mixture = Array2::from_shape_fn((2, 4096), |(ch, i)| {
            ((i as f32 * 0.01 + ch as f32).sin()) * 0.4
        });
        let mut model = HalfSplitModel::new();

        let vocals =
            separate_waveform(&mut model, &mixture, StemChoice::Vocals).expect("vocals");
        let accompaniment =
            separate_waveform(&mut model, &mixture, StemChoice::Accompaniment)
                .expect("accompaniment");

        for i in 0..4096 {
            for ch in 0..2 {
                let sum = vocals[[ch, i]] + accompaniment[[ch, i]];
                assert!(
                    (sum - mixture[[ch, i]]).abs() < 1e-3,
                    "at [{ch},{i}]: {sum} vs {}",
                    mixture[[ch, i]]
                );
            }
        }
    }

    #[test]
    fn denormalization_restores_input_scale() {
        // A loud input must come back loud even though the model only
        // ever sees the normalized waveform.
        let mixture = Array2::from_shape_fn((2, 2048), |(_, i)| ((i as f32 * 0.02).sin()) * 0.9);
        let mut model = HalfSplitModel::new();

        let accompaniment =
            separate_waveform(&mut model, &mixture, StemChoice::Accompaniment)
                .expect("accompaniment");

        let peak = accompaniment.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak > 0.4, "peak = {peak}");
    }

    #[test]
    fn model_failure_propagates() {
        struct FailingModel {
            stems: Vec<String>,
        }
        impl StemModel for FailingModel {
            fn stems(&self) -> &[String] {
                &self.stems
            }
            fn sample_rate(&self) -> u32 {
                44_100
            }
            fn apply(&mut self, _: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
                Err(SeparationError::Inference("simulated".into()))
            }
        }

        let mixture = Array2::zeros((2, 64));
        let mut model = FailingModel {
            stems: vec!["vocals".into()],
        };
        let err = separate_waveform(&mut model, &mixture, StemChoice::Vocals)
            .expect_err("should fail");
        assert!(matches!(err, SeparationError::Inference(_)));
    }
}
