//! Integration tests for the axwhisper CLI.

use axwhisper::model::ModelVariant;
use axwhisper_cli::cli::{Cli, run};
use axwhisper_cli::config::Config;
use clap::Parser;
use std::path::Path;

#[test]
fn resolves_default_model_paths_from_variant() {
    let cli = Cli::parse_from([
        "axwhisper",
        "-w",
        "a.wav",
        "--model-type",
        "tiny",
        "--model-dir",
        "/opt/models",
    ]);

    let config = Config::try_from(cli).unwrap();

    assert_eq!(config.model.variant, ModelVariant::Tiny);
    assert_eq!(config.model.paths.encoder, Path::new("/opt/models/tiny-encoder.onnx"));
    assert_eq!(
        config.model.paths.positional_embedding,
        Path::new("/opt/models/tiny-positional_embedding.bin")
    );
    assert_eq!(config.language, "zh");
}

#[test]
fn explicit_paths_override_defaults() {
    let cli = Cli::parse_from(["axwhisper", "-w", "a.wav", "-e", "custom.onnx", "-t", "vocab.txt"]);

    let config = Config::try_from(cli).unwrap();

    assert_eq!(config.model.paths.encoder, Path::new("custom.onnx"));
    assert_eq!(config.model.paths.tokens, Path::new("vocab.txt"));
    assert_eq!(
        config.model.paths.decoder_main,
        Path::new("../models/small-decoder-main.onnx")
    );
}

#[test]
fn unknown_model_type_is_rejected() {
    let cli = Cli::parse_from(["axwhisper", "-w", "a.wav", "--model-type", "large"]);

    let err = Config::try_from(cli).unwrap_err();

    assert!(format!("{err:?}").contains("large"));
}

#[test]
fn missing_wav_fails() {
    let path = std::env::temp_dir().join("axwhisper-cli-test-missing.wav");
    let cli = Cli::parse_from(["axwhisper", "-w", path.to_str().unwrap()]);

    assert!(run(cli).is_err());
}

#[test]
#[ignore = "exported Whisper models required in ../models"]
fn transcribes_wav_file() {
    let path = std::env::temp_dir().join("axwhisper-cli-test-silence.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("failed to create wav");
    for _ in 0..16000 {
        writer.write_sample(0i16).expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize wav");

    let cli = Cli::parse_from(["axwhisper", "-w", path.to_str().unwrap(), "--language", "en"]);

    run(cli).expect("failed to transcribe");

    std::fs::remove_file(path).ok();
}
