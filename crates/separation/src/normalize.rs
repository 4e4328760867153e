use ndarray::{Array2, Axis};

const MIN_STD: f32 = 1e-6;

/// Per-file loudness statistics, measured on the channel-averaged mixture
/// and inverted on every stem so output levels match the input.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    mean: f32,
    std: f32,
}

impl Normalization {
    pub fn measure(mixture: &Array2<f32>) -> Self {
        let reference = mixture.mean_axis(Axis(0)).unwrap_or_default();
        let mean = reference.mean().unwrap_or(0.0);
        let mut std = reference.std(0.0);
        if !std.is_finite() || std < MIN_STD {
            std = 1.0;
        }
        Self { mean, std }
    }

    pub fn apply(&self, waveform: &Array2<f32>) -> Array2<f32> {
        waveform.mapv(|v| (v - self.mean) / self.std)
    }

    pub fn invert_in_place(&self, waveform: &mut Array2<f32>) {
        waveform.mapv_inplace(|v| v * self.std + self.mean);
    }
}
