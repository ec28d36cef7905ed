//! Whisper special token ids and the start-of-transcript prefix.

/// `<|endoftext|>`
pub const EOT: u32 = 50257;
/// `<|startoftranscript|>`
pub const SOT: u32 = 50258;
/// `<|translate|>`
pub const TRANSLATE: u32 = 50358;
/// `<|transcribe|>`
pub const TRANSCRIBE: u32 = 50359;
/// `<|nospeech|>`
pub const NO_SPEECH: u32 = 50362;
/// `<|notimestamps|>`
pub const NO_TIMESTAMPS: u32 = 50363;
/// Leading space token, suppressed on the first step to avoid empty output.
pub const BLANK: u32 = 220;

/// Multilingual vocabulary size.
pub const VOCAB_SIZE: usize = 51865;
/// Decoder context window.
pub const N_TEXT_CTX: usize = 448;

/// Fixed decode prefix: `[SOT, language, TRANSCRIBE, NO_TIMESTAMPS]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SotSequence([u32; SotSequence::LEN]);

impl SotSequence {
    pub const LEN: usize = 4;

    /// Build the prefix for a language token (see [`crate::language`]).
    pub fn new(language_token: u32) -> Self {
        Self([SOT, language_token, TRANSCRIBE, NO_TIMESTAMPS])
    }

    pub fn language_token(&self) -> u32 {
        self.0[1]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Token ids as i32, the width the decoder stages consume.
    pub fn to_i32_vec(&self) -> Vec<i32> {
        self.0.iter().map(|&t| t as i32).collect()
    }
}

/// Most tokens the loop can emit after the prefix.
pub const MAX_GENERATED_TOKENS: usize = N_TEXT_CTX - SotSequence::LEN;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language;

    #[test]
    fn only_language_slot_varies() {
        let sequences: Vec<_> = ["en", "zh", "ja", "de", "xx"]
            .into_iter()
            .map(|code| SotSequence::new(language::token_id(code)))
            .collect();

        for seq in &sequences {
            let s = seq.as_slice();
            assert_eq!(s.len(), 4);
            assert_eq!((s[0], s[2], s[3]), (SOT, TRANSCRIBE, NO_TIMESTAMPS));
        }

        assert_eq!(sequences[0].language_token(), 50259);
        assert_eq!(sequences[1].language_token(), 50260);
        assert_ne!(sequences[0], sequences[1]);
    }

    #[test]
    fn prefix_leaves_room_in_context() {
        assert_eq!(MAX_GENERATED_TOKENS, 444);
        assert_eq!(
            SotSequence::new(50259).to_i32_vec(),
            vec![50258, 50259, 50359, 50363]
        );
    }
}
