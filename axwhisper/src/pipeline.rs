//! End-to-end transcription: waveform to text.

use crate::decoder::{DecodeStats, GreedyDecoder, Termination};
use crate::detokenizer::TokenTable;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::language;
use crate::model::{ModelVariant, PositionalEmbedding};
use crate::runner::{OrtRunner, OutputDevice, StageRunner};
use crate::script::ScriptConverter;
use crate::tokens::SotSequence;
use ort::session::builder::SessionBuilder;
use std::path::{Path, PathBuf};

/// Output of one transcription.
#[derive(Clone, Debug, PartialEq)]
pub struct Transcription {
    pub text: String,
    /// Generated token ids, without prefix or EOT.
    pub tokens: Vec<u32>,
    /// Language code as requested.
    pub language: String,
    /// Whether the text went through script conversion.
    pub script_converted: bool,
    pub stats: DecodeStats,
    pub termination: Termination,
}

/// Feature extraction, greedy decoding and detokenization over one set of stages.
pub struct Transcriber<R: StageRunner> {
    features: FeatureExtractor,
    decoder: GreedyDecoder<R>,
    tokens: TokenTable,
    script: Option<ScriptConverter>,
}

impl<R: StageRunner> Transcriber<R> {
    pub fn new(decoder: GreedyDecoder<R>, tokens: TokenTable) -> Self {
        Self {
            features: FeatureExtractor::WHISPER,
            decoder,
            tokens,
            script: None,
        }
    }

    /// Convert non-English output with `script`.
    pub fn with_script_converter(mut self, script: ScriptConverter) -> Self {
        self.script = Some(script);
        self
    }

    pub fn decoder(&self) -> &GreedyDecoder<R> {
        &self.decoder
    }

    /// Dump intermediate tensors into `dir` on each transcription.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.decoder = self.decoder.with_dump_dir(dir);
        self
    }

    /// Transcribe 16 kHz mono samples.
    ///
    /// Only the first 30 s are decoded. Unknown language codes fall back to
    /// Chinese with a warning.
    pub fn transcribe(&mut self, audio: &[f32], language: &str) -> Result<Transcription> {
        if !language::is_supported(language) {
            tracing::warn!(
                language,
                fallback = language::LANGUAGES[language::FALLBACK_INDEX].0,
                "unsupported language, falling back"
            );
        }

        let mel = self.features.extract(audio);
        let sot = SotSequence::new(language::token_id(language));
        let output = self.decoder.decode(&mel, sot)?;

        let mut text = self.tokens.decode(&output.tokens)?;
        let script = self.script_for(language);
        if let Some(script) = script {
            text = script.convert(&text);
        }

        Ok(Transcription {
            text,
            tokens: output.tokens,
            language: language.to_string(),
            script_converted: script.is_some(),
            stats: output.stats,
            termination: output.termination,
        })
    }

    /// Converter applied to output in `language`. English is never converted.
    fn script_for(&self, language: &str) -> Option<&ScriptConverter> {
        if language == "en" {
            return None;
        }
        if self.script.is_none() {
            tracing::warn!(language, "no script converter configured, output left unconverted");
        }
        self.script.as_ref()
    }
}

/// Artifact locations for one model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    pub encoder: PathBuf,
    pub decoder_main: PathBuf,
    pub decoder_loop: PathBuf,
    pub positional_embedding: PathBuf,
    pub tokens: PathBuf,
}

impl ModelPaths {
    /// Conventional `<dir>/<variant>-*` file names.
    pub fn in_dir(dir: impl AsRef<Path>, variant: ModelVariant) -> Self {
        let dir = dir.as_ref();
        let file = |suffix: &str| dir.join(format!("{variant}-{suffix}"));

        Self {
            encoder: file("encoder.onnx"),
            decoder_main: file("decoder-main.onnx"),
            decoder_loop: file("decoder-loop.onnx"),
            positional_embedding: file("positional_embedding.bin"),
            tokens: file("tokens.txt"),
        }
    }
}

/// Whisper transcription on ONNX Runtime.
pub type WhisperPipeline = Transcriber<OrtRunner>;

impl WhisperPipeline {
    /// Load all stages and resources.
    ///
    /// # Arguments
    ///
    /// * `paths` - Model and resource files
    /// * `variant` - Model size, selects the positional embedding width
    /// * `session_builder` - ONNX session builder carrying execution provider settings
    /// * `device` - Memory the attention caches stay in between stages
    pub fn from_files(
        paths: &ModelPaths,
        variant: ModelVariant,
        session_builder: SessionBuilder,
        device: OutputDevice,
    ) -> Result<Self> {
        let load = |builder: SessionBuilder, path: &PathBuf| -> Result<OrtRunner> {
            Ok(OrtRunner::load(builder, path)?.with_output_device(device))
        };
        let encoder = load(session_builder.clone(), &paths.encoder)?;
        let main = load(session_builder.clone(), &paths.decoder_main)?;
        let looped = load(session_builder, &paths.decoder_loop)?;

        let positional = PositionalEmbedding::from_file(&paths.positional_embedding, variant)?;
        let tokens = TokenTable::from_file(&paths.tokens)?;

        let decoder = GreedyDecoder::new(encoder, main, looped, positional)?;

        Ok(Self::new(decoder, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_follow_variant() {
        let paths = ModelPaths::in_dir("../models", ModelVariant::Small);

        assert_eq!(paths.encoder, Path::new("../models/small-encoder.onnx"));
        assert_eq!(paths.decoder_main, Path::new("../models/small-decoder-main.onnx"));
        assert_eq!(paths.decoder_loop, Path::new("../models/small-decoder-loop.onnx"));
        assert_eq!(
            paths.positional_embedding,
            Path::new("../models/small-positional_embedding.bin")
        );
        assert_eq!(paths.tokens, Path::new("../models/small-tokens.txt"));
    }
}
