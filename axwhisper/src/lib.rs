//! axwhisper: offline Whisper speech-to-text over split encoder/decoder models.
//!
//! The model is exported as three accelerator stages: an encoder, a
//! decoder-main stage that consumes the 4-token start-of-transcript prefix,
//! and a decoder-loop stage that emits one token per call against a
//! key/value cache. This crate computes log-mel features, drives the stages
//! with a greedy decoder, and turns the resulting tokens into text.
//!
//! # Architecture
//!
//! - [`features::FeatureExtractor`]: 16 kHz samples to an 80 x 3000 log-mel window
//! - [`runner::StageRunner`]: load/prepare/upload/run/download lifecycle of one stage
//! - [`decoder::GreedyDecoder`]: encoder, decoder-main, decoder-loop state machine
//! - [`detokenizer::TokenTable`]: token ids to text
//! - [`pipeline::Transcriber`]: all of the above for one waveform
//!
//! # Quick Start
//!
//! ```ignore
//! use axwhisper::audio::read_audio_mono;
//! use axwhisper::model::ModelVariant;
//! use axwhisper::pipeline::{ModelPaths, WhisperPipeline};
//! use axwhisper::runner::OutputDevice;
//! use ort::session::Session;
//!
//! let audio = read_audio_mono("speech.wav")?;
//!
//! let paths = ModelPaths::in_dir("models", ModelVariant::Small);
//! let builder = Session::builder()?;
//! let mut pipeline =
//!     WhisperPipeline::from_files(&paths, ModelVariant::Small, builder, OutputDevice::HOST)?;
//!
//! let result = pipeline.transcribe(&audio, "en")?;
//! println!("{}", result.text);
//! ```

pub mod audio;
pub mod decoder;
pub mod detokenizer;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod language;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod script;
pub mod stages;
pub mod suppress;
pub mod tensor;
pub mod tokens;

pub use error::{Error, Result};
pub use pipeline::{Transcriber, Transcription, WhisperPipeline};
