//! Traditional to simplified Chinese conversion from OpenCC dictionaries.

use crate::error::{ResourceError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Phrase and character mapping applied with greedy longest match.
#[derive(Clone, Debug, Default)]
pub struct ScriptConverter {
    table: HashMap<String, String>,
    /// Longest key, in chars.
    max_key_len: usize,
}

impl ScriptConverter {
    /// Load one or more dictionaries. Later files do not override earlier ones.
    pub fn from_files<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut converter = Self::default();

        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|e| ResourceError::read(path, e))?;
            let before = converter.len();

            converter.extend_from_str(&text).map_err(|line| {
                ResourceError::MalformedDictionary {
                    path: path.to_path_buf(),
                    line,
                }
            })?;

            tracing::debug!(
                path = ?path.display(),
                entries = converter.len() - before,
                "dictionary loaded"
            );
        }

        Ok(converter)
    }

    /// Add `key<TAB>value [alt...]` lines. Blank lines are skipped.
    ///
    /// Returns the 1-based number of the first line without a tab.
    fn extend_from_str(&mut self, text: &str) -> std::result::Result<(), usize> {
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let (key, values) = line.split_once('\t').ok_or(index + 1)?;
            let Some(value) = values.split_whitespace().next() else {
                return Err(index + 1);
            };

            self.insert(key, value);
        }
        Ok(())
    }

    /// Add a mapping unless `key` is already present.
    pub fn insert(&mut self, key: &str, value: &str) {
        if key.is_empty() || self.table.contains_key(key) {
            return;
        }
        self.max_key_len = self.max_key_len.max(key.chars().count());
        self.table.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Convert `text`, preferring the longest dictionary key at each position.
    pub fn convert(&self, text: &str) -> String {
        if self.table.is_empty() {
            return text.to_string();
        }

        // Byte offsets of every char boundary, including the end.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n_chars = bounds.len() - 1;

        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while pos < n_chars {
            let longest = self.max_key_len.min(n_chars - pos);

            let matched = (1..=longest).rev().find_map(|len| {
                let key = &text[bounds[pos]..bounds[pos + len]];
                self.table.get(key).map(|value| (len, value))
            });

            match matched {
                Some((len, value)) => {
                    out.push_str(value);
                    pos += len;
                }
                None => {
                    out.push_str(&text[bounds[pos]..bounds[pos + 1]]);
                    pos += 1;
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn converter(dict: &str) -> ScriptConverter {
        let mut converter = ScriptConverter::default();
        converter.extend_from_str(dict).unwrap();
        converter
    }

    #[test]
    fn converts_characters_and_passes_through_unknown() {
        let converter = converter("們\t们\n這\t这\n");

        assert_eq!(converter.convert("這是我們"), "这是我们");
        assert_eq!(converter.convert("hello"), "hello");
    }

    #[test]
    fn prefers_longest_match() {
        let converter = converter("頭\t头\n頭髮\t头发\n髮\t发 髪\n");

        assert_eq!(converter.convert("頭髮長"), "头发長");
        assert_eq!(converter.convert("頭"), "头");
    }

    #[test]
    fn uses_first_listed_value() {
        assert_eq!(converter("乾\t干 乾\n").convert("乾"), "干");
    }

    #[test]
    fn empty_converter_is_identity() {
        assert_eq!(ScriptConverter::default().convert("繁體"), "繁體");
    }

    #[test]
    fn earlier_entries_win() {
        assert_eq!(converter("後\t后\n後\t後\n").convert("後"), "后");
    }

    #[test]
    fn rejects_line_without_tab() {
        let mut converter = ScriptConverter::default();

        assert_eq!(converter.extend_from_str("們\t们\nbroken line\n"), Err(2));
    }

    #[test]
    fn loads_dictionary_files() {
        let dir = std::env::temp_dir().join("axwhisper_test_dicts");
        std::fs::create_dir_all(&dir).unwrap();
        let phrases = dir.join("TSPhrases.txt");
        let chars = dir.join("TSCharacters.txt");
        std::fs::write(&phrases, "頭髮\t头发\n").unwrap();
        std::fs::write(&chars, "頭\t头\n長\t长 長\n").unwrap();

        let converter = ScriptConverter::from_files([&phrases, &chars]).unwrap();

        assert_eq!(converter.len(), 3);
        assert_eq!(converter.convert("頭髮很長"), "头发很长");

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_file_reports_path_and_line() {
        let path = std::env::temp_dir().join("axwhisper_test_bad_dict.txt");
        std::fs::write(&path, "\n無\n").unwrap();

        let result = ScriptConverter::from_files([&path]);

        assert!(matches!(
            result,
            Err(Error::Resource(ResourceError::MalformedDictionary { line: 2, .. }))
        ));

        std::fs::remove_file(path).ok();
    }
}
