//! Decoding uploads into the fixed-rate stereo layout the model expects.

use std::fs::File;
use std::path::Path;

use ndarray::Array2;
use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::SeparationError;
use crate::Result;

const RESAMPLE_CHUNK: usize = 1024;

/// Decodes `path` into a stereo waveform at `target_rate`, shaped
/// `[2, samples]`. Mono input is duplicated onto both channels; extra
/// channels beyond the first two are dropped.
pub fn decode_to_stereo(path: &Path, target_rate: u32) -> Result<Array2<f32>> {
    let (interleaved, channels, source_rate) = decode_interleaved(path)?;
    if interleaved.is_empty() || channels == 0 {
        return Err(SeparationError::UnsupportedAudio(
            "no audio samples decoded".into(),
        ));
    }

    let (mut left, mut right) = split_stereo(&interleaved, channels);
    if source_rate != target_rate {
        tracing::debug!(source_rate, target_rate, "resampling input");
        (left, right) = resample_stereo(&left, &right, source_rate, target_rate)?;
    }

    let frames = left.len().min(right.len());
    Ok(Array2::from_shape_fn((2, frames), |(ch, i)| {
        if ch == 0 {
            left[i]
        } else {
            right[i]
        }
    }))
}

fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SeparationError::Decode(format!("unrecognized container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::UnsupportedAudio("no decodable audio track".into()))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SeparationError::UnsupportedAudio("unknown sample rate".into()))?;
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SeparationError::Decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(SeparationError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if channels == 0 {
                    channels = spec.channels.count();
                }
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped rather than failing the whole file.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(SeparationError::Decode(e.to_string())),
        }
    }

    Ok((samples, channels, source_rate))
}

fn split_stereo(interleaved: &[f32], channels: usize) -> (Vec<f32>, Vec<f32>) {
    let frames = interleaved.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }
    (left, right)
}

fn resample_stereo(
    left: &[f32],
    right: &[f32],
    from: u32,
    to: u32,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 2)
        .map_err(|e| SeparationError::Resample(e.to_string()))?;

    let mut out_left = Vec::new();
    let mut out_right = Vec::new();
    let mut pos = 0;
    while pos < left.len() {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(left.len());
        let mut chunk_left = left[pos..end].to_vec();
        let mut chunk_right = right[pos..end].to_vec();
        chunk_left.resize(needed, 0.0);
        chunk_right.resize(needed, 0.0);

        let processed = resampler
            .process(&[chunk_left, chunk_right], None)
            .map_err(|e| SeparationError::Resample(e.to_string()))?;
        out_left.extend_from_slice(&processed[0]);
        out_right.extend_from_slice(&processed[1]);
        pos = end;
    }

    Ok((out_left, out_right))
}
