//! Rendering a separated waveform to MP3. The waveform is written as a
//! 16-bit WAV and handed to `ffmpeg` for the final encode.

use std::path::Path;
use std::process::Command;

use ndarray::Array2;

use crate::error::SeparationError;
use crate::Result;

/// Writes a `[2, samples]` waveform as a 16-bit stereo WAV file.
pub fn write_wav(path: &Path, waveform: &Array2<f32>, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: waveform.shape()[0] as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| SeparationError::Encode(e.to_string()))?;

    let frames = waveform.shape()[1];
    for i in 0..frames {
        for ch in 0..waveform.shape()[0] {
            let sample = (waveform[[ch, i]].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(sample)
                .map_err(|e| SeparationError::Encode(e.to_string()))?;
        }
    }
    writer
        .finalize()
        .map_err(|e| SeparationError::Encode(e.to_string()))?;
    Ok(())
}

/// Transcodes `input` to MP3 at a fixed bitrate using the system ffmpeg.
pub fn encode_mp3(input: &Path, output: &Path, bitrate_kbps: u32) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(input)
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg(format!("{bitrate_kbps}k"))
        .arg(output)
        .output()
        .map_err(|e| SeparationError::Encode(format!("failed to spawn ffmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(SeparationError::Encode(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            stderr.trim()
        )));
    }
    Ok(())
}
