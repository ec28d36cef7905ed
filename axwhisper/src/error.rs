//! Error types for axwhisper organized by failure source.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::path::PathBuf;
use thiserror::Error;

/// Transcription error variants.
///
/// Every variant is fatal for the transcription in progress: the decoder never
/// retries and never returns partial output.
#[derive(Debug, Error)]
pub enum Error {
    /// Required file missing, unreadable, or malformed
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Unsupported configuration value
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Model load, prepare, or run failure
    #[error(transparent)]
    Accelerator(#[from] AcceleratorError),

    /// Token id to text conversion failure
    #[error(transparent)]
    Detokenize(#[from] DetokenizeError),
}

/// Input file errors (positional embedding, token table, waveform, dictionaries).
#[derive(Debug, Error)]
pub enum ResourceError {
    /// File could not be opened or read
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Diagnostic dump could not be written
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Positional embedding file does not hold `[context, hidden_width]` floats
    #[error("positional embedding {path:?} has {got} bytes, expected {expected}")]
    EmbeddingSize {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    /// Sample rate validation failed
    #[error("invalid sample rate: expected {expected}Hz, got {got}Hz")]
    InvalidSampleRate { expected: u32, got: u32 },

    /// Channel count validation failed
    #[error("invalid channel count: expected mono or stereo, got {0} channels")]
    InvalidChannels(u16),

    /// Dictionary line without a tab separator
    #[error("malformed dictionary line {line} in {path:?}")]
    MalformedDictionary { path: PathBuf, line: usize },

    /// IO error without a known path
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No known hidden-state width for the requested variant
    #[error("unknown model variant {0:?} (expected one of: tiny, base, small, medium)")]
    UnknownVariant(String),
}

/// Accelerator stage errors.
#[derive(Debug, Error)]
pub enum AcceleratorError {
    /// Model file could not be loaded by the runtime
    #[error("failed to load model {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    /// Stage used before `prepare`
    #[error("stage {stage} used before prepare")]
    NotPrepared { stage: String },

    /// Tensor index outside the stage's declared inputs or outputs
    #[error("stage {stage} has no {direction} tensor at index {index}")]
    NoSuchTensor {
        stage: String,
        direction: &'static str,
        index: usize,
    },

    /// Stage returned fewer outputs than declared
    #[error("missing model output: {name}")]
    MissingOutput { name: String },

    /// Wrong number of inputs passed to `run`
    #[error("stage {stage} expects {expected} inputs, got {got}")]
    InputCount {
        stage: String,
        expected: usize,
        got: usize,
    },

    /// Tensor does not fit the slot it is bound to
    #[error("tensor {name}: expected {expected}, got {got}")]
    ShapeMismatch {
        name: String,
        expected: String,
        got: String,
    },

    /// Tensor lives in accelerator memory and cannot be read by the host
    #[error("stage {stage} output is resident in accelerator memory")]
    DeviceResident { stage: String },

    /// Tensor element type the runner cannot exchange with the host
    #[error("tensor {name} has unsupported element type {ty}")]
    UnsupportedType { name: String, ty: String },

    /// Logits vector has no orderable maximum
    #[error("invalid logits: {0}")]
    InvalidLogits(#[from] MinMaxError),

    /// ONNX Runtime error
    #[error(transparent)]
    Ort(#[from] ort::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Detokenization errors.
#[derive(Debug, Error)]
pub enum DetokenizeError {
    /// Token id not present in the token table
    #[error("token id {0} not in token table")]
    InvalidTokenId(u32),

    /// Token table entry is not valid base64
    #[error("token id {id} has invalid base64 fragment: {source}")]
    InvalidFragment {
        id: u32,
        #[source]
        source: base64::DecodeError,
    },
}

/// Result type alias for axwhisper operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → ResourceError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Resource(ResourceError::Hound(e))
    }
}

// std::io::Error → ResourceError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Resource(ResourceError::Io(e))
    }
}

// ort::Error → AcceleratorError → Error
impl From<ort::Error> for Error {
    fn from(e: ort::Error) -> Self {
        Error::Accelerator(AcceleratorError::Ort(e))
    }
}

// ShapeError → AcceleratorError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Accelerator(AcceleratorError::Shape(e))
    }
}

// MinMaxError → AcceleratorError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Accelerator(AcceleratorError::InvalidLogits(e))
    }
}

impl ResourceError {
    /// Wrap an IO error with the path that caused it.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
