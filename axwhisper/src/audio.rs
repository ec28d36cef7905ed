//! WAV loading.

use crate::error::{ResourceError, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use std::path::Path;

/// Expected sample rate for Whisper models (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Load audio from a WAV file.
///
/// Integer samples of any bit depth are scaled to `[-1.0, 1.0)`.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => ResourceError::read(path, io),
        other => ResourceError::Hound(other),
    })?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    Ok((samples, spec))
}

/// Load audio from a WAV file as mono f32 samples at 16kHz.
///
/// Validates sample rate is 16kHz and downmixes stereo by averaging channels.
///
/// # Errors
///
/// Returns [`ResourceError`] if:
/// - File cannot be read
/// - Sample rate is not 16kHz
/// - Channel count is invalid (0 or > 2)
pub fn read_audio_mono(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let (mut audio, spec) = load_audio(path)?;

    if spec.sample_rate != SAMPLE_RATE {
        return Err(ResourceError::InvalidSampleRate {
            expected: SAMPLE_RATE,
            got: spec.sample_rate,
        }
        .into());
    }

    if spec.channels == 0 || spec.channels > 2 {
        return Err(ResourceError::InvalidChannels(spec.channels).into());
    }

    if spec.channels == 2 {
        audio = audio
            .chunks(2)
            .map(|chunk| chunk.iter().sum::<f32>() / 2.0)
            .collect();
    }

    tracing::debug!(
        samples = audio.len(),
        duration_sec = audio.len() as f32 / SAMPLE_RATE as f32,
        "loaded waveform"
    );

    Ok(audio)
}
