//! Configuration types for resolved CLI arguments.
//!
//! Args structs (for CLI parsing) remain in cli.rs.

use crate::cli::{Cli, ModelArgs};
use axwhisper::model::ModelVariant;
use axwhisper::pipeline::ModelPaths;
use color_eyre::Section;
use eyre::{Context, Result};
use std::path::PathBuf;

/// Resolved model configuration.
#[derive(Debug)]
pub struct ModelConfig {
    pub variant: ModelVariant,
    pub paths: ModelPaths,
}

impl TryFrom<ModelArgs> for ModelConfig {
    type Error = eyre::Error;

    fn try_from(args: ModelArgs) -> Result<Self> {
        let variant: ModelVariant = args
            .model_type
            .parse()
            .wrap_err("invalid --model-type")
            .suggestion("use one of: tiny, base, small, medium")?;

        let defaults = ModelPaths::in_dir(&args.model_dir, variant);
        let paths = ModelPaths {
            encoder: args.encoder.unwrap_or(defaults.encoder),
            decoder_main: args.decoder_main.unwrap_or(defaults.decoder_main),
            decoder_loop: args.decoder_loop.unwrap_or(defaults.decoder_loop),
            positional_embedding: args.position_embedding.unwrap_or(defaults.positional_embedding),
            tokens: args.token.unwrap_or(defaults.tokens),
        };

        Ok(Self { variant, paths })
    }
}

/// Resolved configuration for one transcription.
#[derive(Debug)]
pub struct Config {
    pub model: ModelConfig,
    pub wav: PathBuf,
    pub language: String,
    pub t2s_dicts: Vec<PathBuf>,
    pub dump_dir: Option<PathBuf>,
}

impl TryFrom<Cli> for Config {
    type Error = eyre::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        Ok(Self {
            model: cli.model.try_into()?,
            wav: cli.wav,
            language: cli.language,
            t2s_dicts: cli.t2s_dicts,
            dump_dir: cli.dump_dir,
        })
    }
}
