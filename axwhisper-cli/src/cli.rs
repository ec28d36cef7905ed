//! CLI argument definitions using clap.

use clap::Parser;
use eyre::Result;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "axwhisper")]
#[command(about = "Offline Whisper speech-to-text")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Input WAV file (16 kHz, mono or stereo)
    #[arg(short, long)]
    pub wav: PathBuf,

    /// Spoken language code (unknown codes fall back to zh)
    #[arg(long, default_value = "zh")]
    pub language: String,

    /// OpenCC dictionary applied to non-English output, e.g. TSPhrases.txt (repeatable)
    #[arg(long = "t2s-dict", value_name = "PATH")]
    pub t2s_dicts: Vec<PathBuf>,

    /// Write mel, cross-attention and first-step logits as raw f32 files
    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<PathBuf>,
}

/// Model artifact locations.
///
/// Unset paths default to `<model-dir>/<model-type>-*`.
#[derive(clap::Args, Debug)]
pub struct ModelArgs {
    /// Encoder model
    #[arg(short, long)]
    pub encoder: Option<PathBuf>,

    /// Decoder-main model
    #[arg(short = 'm', long)]
    pub decoder_main: Option<PathBuf>,

    /// Decoder-loop model
    #[arg(short = 'l', long)]
    pub decoder_loop: Option<PathBuf>,

    /// Positional embedding table (raw f32)
    #[arg(short = 'p', long)]
    pub position_embedding: Option<PathBuf>,

    /// Token table
    #[arg(short = 't', long)]
    pub token: Option<PathBuf>,

    /// Model size: tiny, base, small, medium
    #[arg(long, default_value = "small")]
    pub model_type: String,

    /// Directory searched for default model file names
    #[arg(long, default_value = "../models")]
    pub model_dir: PathBuf,
}

/// Execute CLI command - separated for testing.
pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    crate::transcribe::execute(cli.try_into()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_wav_with_defaults() {
        let cli = Cli::parse_from(["axwhisper", "-w", "speech.wav"]);

        assert_eq!(cli.wav.to_str(), Some("speech.wav"));
        assert_eq!(cli.language, "zh");
        assert_eq!(cli.model.model_type, "small");
        assert!(cli.model.encoder.is_none());
        assert!(cli.t2s_dicts.is_empty());
        assert!(cli.dump_dir.is_none());
    }

    #[test]
    fn parses_short_model_flags() {
        let cli = Cli::parse_from([
            "axwhisper", "-e", "enc.onnx", "-m", "main.onnx", "-l", "loop.onnx", "-p", "pe.bin",
            "-t", "tokens.txt", "-w", "a.wav",
        ]);

        assert_eq!(cli.model.encoder.unwrap().to_str(), Some("enc.onnx"));
        assert_eq!(cli.model.decoder_main.unwrap().to_str(), Some("main.onnx"));
        assert_eq!(cli.model.decoder_loop.unwrap().to_str(), Some("loop.onnx"));
        assert_eq!(cli.model.position_embedding.unwrap().to_str(), Some("pe.bin"));
        assert_eq!(cli.model.token.unwrap().to_str(), Some("tokens.txt"));
    }

    #[test]
    fn collects_repeated_dictionaries() {
        let cli = Cli::parse_from([
            "axwhisper",
            "-w",
            "a.wav",
            "--t2s-dict",
            "TSPhrases.txt",
            "--t2s-dict",
            "TSCharacters.txt",
        ]);

        assert_eq!(cli.t2s_dicts.len(), 2);
    }

    #[test]
    fn wav_is_required() {
        assert!(Cli::try_parse_from(["axwhisper"]).is_err());
    }
}
