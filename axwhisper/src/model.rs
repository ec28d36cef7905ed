//! Model size variants and the decoder positional embedding table.

use crate::error::{ConfigError, Error, ResourceError, Result};
use crate::tokens::N_TEXT_CTX;
use ndarray::{Array2, ArrayView1};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Whisper model size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelVariant {
    Tiny,
    Base,
    Small,
    Medium,
}

impl ModelVariant {
    /// Known variants with their names.
    pub const ALL: [(&'static str, ModelVariant); 4] = [
        ("tiny", ModelVariant::Tiny),
        ("base", ModelVariant::Base),
        ("small", ModelVariant::Small),
        ("medium", ModelVariant::Medium),
    ];

    /// Decoder hidden-state width (`n_text_state`).
    pub const fn hidden_width(self) -> usize {
        match self {
            ModelVariant::Tiny => 384,
            ModelVariant::Base => 512,
            ModelVariant::Small => 768,
            ModelVariant::Medium => 1024,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ModelVariant::Tiny => "tiny",
            ModelVariant::Base => "base",
            ModelVariant::Small => "small",
            ModelVariant::Medium => "medium",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, variant)| variant)
            .ok_or_else(|| ConfigError::UnknownVariant(s.to_string()).into())
    }
}

/// Decoder positional embedding, `[N_TEXT_CTX, hidden_width]`.
#[derive(Clone, Debug)]
pub struct PositionalEmbedding(Array2<f32>);

impl PositionalEmbedding {
    /// Read a raw little-endian f32 table for the given variant.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] if the file cannot be read or its size does not
    /// match `N_TEXT_CTX * hidden_width` floats.
    pub fn from_file(path: impl AsRef<Path>, variant: ModelVariant) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ResourceError::read(path, e))?;

        let width = variant.hidden_width();
        let expected = N_TEXT_CTX * width * size_of::<f32>();

        if bytes.len() != expected {
            return Err(ResourceError::EmbeddingSize {
                path: path.to_path_buf(),
                expected,
                got: bytes.len(),
            }
            .into());
        }

        let values = bytes
            .chunks_exact(size_of::<f32>())
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        tracing::debug!(path = ?path.display(), width, "positional embedding loaded");

        Self::from_shape_vec(width, values)
    }

    /// Build from row-major values.
    pub fn from_shape_vec(width: usize, values: Vec<f32>) -> Result<Self> {
        Ok(Self(Array2::from_shape_vec((N_TEXT_CTX, width), values)?))
    }

    pub fn width(&self) -> usize {
        self.0.ncols()
    }

    /// Embedding row for a decode position, `None` past the context window.
    pub fn row(&self, offset: usize) -> Option<ArrayView1<'_, f32>> {
        (offset < self.0.nrows()).then(|| self.0.row(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_known_variants() {
        assert_eq!("tiny".parse::<ModelVariant>().unwrap().hidden_width(), 384);
        assert_eq!("small".parse::<ModelVariant>().unwrap().hidden_width(), 768);
        assert_eq!(ModelVariant::Base.to_string(), "base");
    }

    #[test]
    fn rejects_unknown_variant() {
        let result = "large".parse::<ModelVariant>();

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownVariant(name))) if name == "large"
        ));
    }

    #[test]
    fn reads_embedding_rows() {
        let path = std::env::temp_dir().join("axwhisper_test_pe_tiny.bin");
        let width = ModelVariant::Tiny.hidden_width();

        let mut file = std::fs::File::create(&path).unwrap();
        for i in 0..N_TEXT_CTX * width {
            file.write_all(&(i as f32).to_le_bytes()).unwrap();
        }
        drop(file);

        let pe = PositionalEmbedding::from_file(&path, ModelVariant::Tiny).unwrap();

        assert_eq!(pe.width(), 384);
        let row = pe.row(4).unwrap();
        assert_eq!(row[0], (4 * 384) as f32);
        assert_eq!(row[383], (4 * 384 + 383) as f32);
        assert!(pe.row(N_TEXT_CTX).is_none());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_embedding_of_wrong_variant() {
        let path = std::env::temp_dir().join("axwhisper_test_pe_wrong.bin");
        std::fs::write(&path, vec![0u8; N_TEXT_CTX * 384 * 4]).unwrap();

        let result = PositionalEmbedding::from_file(&path, ModelVariant::Small);

        assert!(matches!(
            result,
            Err(Error::Resource(ResourceError::EmbeddingSize { .. }))
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_embedding_is_resource_error() {
        let path = std::env::temp_dir().join("axwhisper_test_pe_missing.bin");

        let result = PositionalEmbedding::from_file(&path, ModelVariant::Tiny);

        assert!(matches!(result, Err(Error::Resource(ResourceError::Read { .. }))));
    }
}
