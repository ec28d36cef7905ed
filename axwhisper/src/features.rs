//! Log-mel feature extraction for the Whisper encoder.

use crate::audio::SAMPLE_RATE;
use crate::tensor::HostTensor;
use ndarray::{Array2, ArrayView2, s};
use std::f32::consts::PI;

/// Log-mel spectrogram features.
///
/// Row-major `(n_mels, n_frames)` matrix, already normalized and resized to the
/// encoder's fixed frame count.
#[derive(Clone, Debug)]
pub struct MelSpectrogram(Array2<f32>);

impl MelSpectrogram {
    /// Number of mel bands (rows).
    pub fn n_mels(&self) -> usize {
        self.0.nrows()
    }

    /// Number of time frames (columns).
    pub fn n_frames(&self) -> usize {
        self.0.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.0.view()
    }

    /// Contiguous row-major copy of the features.
    pub fn to_row_major_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }

    /// Host tensor shaped `[1, n_mels, n_frames]` for the encoder input.
    pub fn to_host_tensor(&self) -> HostTensor {
        HostTensor::f32(vec![1, self.n_mels(), self.n_frames()], self.to_row_major_vec())
    }
}

/// Whisper mel-spectrogram feature extractor.
///
/// Centered STFT with reflect padding and a periodic Hann window, power
/// spectrogram projected on a Slaney mel filterbank, then log10 with an 8-decade
/// dynamic range clamp scaled to roughly `[0, 1]`.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub sample_rate: usize,
    /// Fixed number of output frames (30 s at the hop length)
    pub n_frames: usize,
}

impl FeatureExtractor {
    /// Feature extractor for 80-mel Whisper models.
    pub const WHISPER: Self = Self {
        n_mels: 80,
        n_fft: 400,
        hop_length: 160,
        sample_rate: SAMPLE_RATE as usize,
        n_frames: 3000,
    };

    /// Extract features from 16kHz mono samples.
    ///
    /// Audio longer than `n_frames * hop_length` samples is truncated; shorter
    /// audio is right-padded with zero frames after normalization.
    pub fn extract(&self, audio: &[f32]) -> MelSpectrogram {
        let spectrogram = stft(audio, self.n_fft, self.hop_length);

        let filterbank = mel_filterbank(self.n_fft, self.n_mels, self.sample_rate);
        let mel = filterbank.dot(&spectrogram);
        let mel = normalize_log_mel(mel);

        let computed = mel.ncols().min(self.n_frames);
        let mut features = Array2::<f32>::zeros((self.n_mels, self.n_frames));
        features
            .slice_mut(s![.., ..computed])
            .assign(&mel.slice(s![.., ..computed]));

        tracing::debug!(
            computed_frames = mel.ncols(),
            n_frames = self.n_frames,
            "extracted log-mel features"
        );

        MelSpectrogram(features)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::WHISPER
    }
}

/// Apply `log10(max(x, 1e-10))`, clamp to `global_max - 8`, then `(x + 4) / 4`.
fn normalize_log_mel(mel: Array2<f32>) -> Array2<f32> {
    let log_mel = mel.mapv(|x| x.max(1e-10).log10());
    let max = log_mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = max - 8.0;

    log_mel.mapv(|x| (x.max(floor) + 4.0) / 4.0)
}

/// Periodic Hann window, as used for spectral analysis.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Mirror an index into `0..n` without repeating the edge sample.
fn reflect_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }

    let period = 2 * (n as isize - 1);
    let i = i.rem_euclid(period);

    if i >= n as isize {
        (period - i) as usize
    } else {
        i as usize
    }
}

/// Reflect-pad `n_fft / 2` samples on both sides so frames are centered.
fn center_pad(audio: &[f32], n_fft: usize) -> Vec<f32> {
    let silence = [0.0];
    let audio = if audio.is_empty() { &silence[..] } else { audio };

    let pad = (n_fft / 2) as isize;
    let padded_len = audio.len() as isize + 2 * pad;

    (0..padded_len)
        .map(|j| audio[reflect_index(j - pad, audio.len())])
        .collect()
}

/// Compute the centered Short-Time Fourier Transform power spectrogram.
///
/// Returns `(n_fft / 2 + 1, num_frames)`.
fn stft(audio: &[f32], n_fft: usize, hop_length: usize) -> Array2<f32> {
    use rustfft::{FftPlanner, num_complex::Complex};

    let padded = center_pad(audio, n_fft);
    let window = hann_window(n_fft);
    let num_frames = (padded.len() - n_fft) / hop_length + 1;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut frame = vec![Complex::new(0.0, 0.0); n_fft];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;

        for (i, value) in frame.iter_mut().enumerate() {
            *value = Complex::new(padded[start + i] * window[i], 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            spectrogram[[k, frame_idx]] = frame[k].norm_sqr();
        }
    }

    spectrogram
}

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4_f32.ln() / 27.0
}

/// Convert frequency in Hz to the Slaney mel scale (linear below 1kHz, log above).
fn hz_to_mel(freq: f32) -> f32 {
    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / log_step()
    } else {
        freq / F_SP
    }
}

/// Convert Slaney mel scale to frequency in Hz.
fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create a Slaney-normalized mel filterbank spanning `[0, sample_rate / 2]`.
///
/// Returns `(n_mels, n_fft / 2 + 1)`.
fn mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];
        let enorm = 2.0 / (right - left);

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);

            filterbank[[mel_idx, freq_idx]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    filterbank
}
