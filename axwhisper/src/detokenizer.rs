//! Token id to text conversion.

use crate::error::{DetokenizeError, ResourceError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;

/// Byte-level vocabulary: the line index is the token id, the first
/// space-separated field is the base64-encoded byte fragment.
#[derive(Clone, Debug)]
pub struct TokenTable {
    fragments: Vec<String>,
}

impl TokenTable {
    /// Load a token table file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ResourceError::read(path, e))?;
        let table = Self::parse(&text);

        tracing::debug!(path = ?path.display(), entries = table.len(), "token table loaded");
        Ok(table)
    }

    /// Parse table text. Lines may carry extra fields after the fragment.
    pub fn parse(text: &str) -> Self {
        let fragments = text
            .lines()
            .map(|line| line.split(' ').next().unwrap_or_default().to_string())
            .collect();

        Self { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Decoded bytes of one token.
    pub fn bytes(&self, id: u32) -> Result<Vec<u8>> {
        let fragment = self
            .fragments
            .get(id as usize)
            .ok_or(DetokenizeError::InvalidTokenId(id))?;

        let bytes = STANDARD
            .decode(fragment)
            .map_err(|source| DetokenizeError::InvalidFragment { id, source })?;

        Ok(bytes)
    }

    /// Concatenate the fragments of `tokens` into text.
    ///
    /// Fragments are joined as bytes before UTF-8 conversion since a single
    /// character may span several tokens.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut bytes = Vec::new();
        for &id in tokens {
            bytes.extend(self.bytes(id)?);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn table() -> TokenTable {
        // "Hi", " there", first and second half of "你" (e4 bd a0)
        TokenTable::parse("SGk= 0\nIHRoZXJl 1\n5L0= 2\noA== 3\n")
    }

    #[test]
    fn concatenates_fragments_in_order() {
        let table = table();

        assert_eq!(table.len(), 4);
        assert_eq!(table.decode(&[0, 1]).unwrap(), "Hi there");
        assert_eq!(table.decode(&[1, 0]).unwrap(), " thereHi");
        assert_eq!(table.decode(&[]).unwrap(), "");
    }

    #[test]
    fn joins_multibyte_character_across_tokens() {
        assert_eq!(table().decode(&[2, 3]).unwrap(), "你");
    }

    #[test]
    fn unknown_id_is_an_error() {
        assert!(matches!(
            table().decode(&[0, 99]),
            Err(Error::Detokenize(DetokenizeError::InvalidTokenId(99)))
        ));
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let table = TokenTable::parse("!!!! 0\n");

        assert!(matches!(
            table.decode(&[0]),
            Err(Error::Detokenize(DetokenizeError::InvalidFragment { id: 0, .. }))
        ));
    }

    #[test]
    fn missing_table_is_resource_error() {
        let path = std::env::temp_dir().join("axwhisper_test_missing_tokens.txt");

        assert!(matches!(
            TokenTable::from_file(path),
            Err(Error::Resource(ResourceError::Read { .. }))
        ));
    }
}
