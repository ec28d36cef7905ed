//! Transcribe a WAV file and print the text.

use crate::config::{Config, ModelConfig};
use axwhisper::WhisperPipeline;
use axwhisper::audio::read_audio_mono;
use axwhisper::decoder::Termination;
use axwhisper::runner::OutputDevice;
use axwhisper::script::ScriptConverter;
use color_eyre::Section;
use eyre::{Context, Result};
#[allow(unused_imports)]
use ort::execution_providers::*;
use ort::session::Session;
use std::time::Instant;

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        wav = ?config.wav.display(),
        model = %config.model.variant,
        language = %config.language,
        "transcribing"
    );

    let audio = read_audio_mono(&config.wav)
        .wrap_err_with(|| format!("failed to load audio: {:?}", config.wav.display()))?;

    let s = Instant::now();

    let mut pipeline = build_pipeline(&config.model)?;

    if !config.t2s_dicts.is_empty() {
        let converter = ScriptConverter::from_files(&config.t2s_dicts)
            .wrap_err("failed to load t2s dictionaries")?;
        pipeline = pipeline.with_script_converter(converter);
    }

    if let Some(dir) = &config.dump_dir {
        pipeline = pipeline.with_dump_dir(dir);
    }

    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "models loaded");

    let s = Instant::now();

    let result = pipeline
        .transcribe(&audio, &config.language)
        .wrap_err("transcription failed")?;

    let d = s.elapsed();
    tracing::info!(
        duration = %format_secs(d.as_secs_f32()),
        first_token_ms = result.stats.first_token.as_millis(),
        tokens = result.tokens.len(),
        tokens_per_sec = result.stats.tokens_per_sec(),
        "inference completed"
    );

    if result.termination == Termination::ContextExhausted {
        tracing::warn!("context window filled before end of transcript, output may be truncated");
    }

    println!("{}", result.text);

    Ok(())
}

/// Build the pipeline with execution providers configured by Cargo features.
///
/// Providers are tried in order; CPU is always available as fallback.
///
/// # Execution Providers
///
/// Enabled via Cargo features:
/// - `cuda` - NVIDIA CUDA
/// - `tensorrt` - NVIDIA TensorRT
/// - `openvino` - Intel OpenVINO
/// - `directml` - DirectML (Windows)
/// - `coreml` - CoreML (macOS)
fn build_pipeline(model: &ModelConfig) -> Result<WhisperPipeline> {
    tracing::info!(encoder = ?model.paths.encoder.display(), "loading models");

    let builder = Session::builder()?.with_execution_providers([
        #[cfg(feature = "cuda")]
        CUDAExecutionProvider::default().build(),
        #[cfg(feature = "tensorrt")]
        TensorRTExecutionProvider::default().build(),
        #[cfg(feature = "openvino")]
        OpenVINOExecutionProvider::default()
            .with_device_type("HETERO:GPU,CPU")
            .with_cache_dir(".cache/ort")
            .build(),
        #[cfg(feature = "directml")]
        DirectMLExecutionProvider::default().build(),
        #[cfg(feature = "coreml")]
        CoreMLExecutionProvider::default().build(),
    ])?;

    let device = output_device();
    tracing::debug!(?device, "attention cache memory");

    WhisperPipeline::from_files(&model.paths, model.variant, builder, device)
        .wrap_err("failed to load models")
        .suggestion("pass -e/-m/-l/-p/-t or --model-dir to point at the exported model files")
}

/// Memory the attention caches stay in, matching the first enabled provider
/// that exposes device memory.
#[allow(unreachable_code)]
fn output_device() -> OutputDevice {
    #[cfg(any(feature = "cuda", feature = "tensorrt"))]
    return OutputDevice::new(ort::memory::AllocationDevice::CUDA, 0);

    #[cfg(all(feature = "directml", not(any(feature = "cuda", feature = "tensorrt"))))]
    return OutputDevice::new(ort::memory::AllocationDevice::DIRECTML, 0);

    OutputDevice::HOST
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
