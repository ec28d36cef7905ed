//! Greedy autoregressive decoding over the three accelerator stages.
//!
//! One decode runs the encoder once, the decoder-main stage once over the
//! start-of-transcript prefix, then the decoder-loop stage one token at a
//! time until end-of-transcript or the context window is full:
//!
//! ```text
//! Init --encode--> FirstStep --decoder-main--> Loop --EOT / cap--> Terminated
//!                                               ^  |
//!                                               +--+ decoder-loop step
//! ```

use crate::diagnostics;
use crate::error::{AcceleratorError, Result};
use crate::features::MelSpectrogram;
use crate::model::PositionalEmbedding;
use crate::runner::StageRunner;
use crate::stages::{
    CrossAttentionCache, DecoderLoopStage, DecoderMainStage, EncoderStage, SelfAttentionCache,
    check_wiring,
};
use crate::suppress::{argmax, suppress_tokens};
use crate::tokens::{EOT, MAX_GENERATED_TOKENS, N_TEXT_CTX, SotSequence};
use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Additive attention bias over the decoder context window.
///
/// Entries are `0.0` for attendable positions and `-inf` otherwise. The
/// attendable positions are always a suffix of the window.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodingMask {
    values: Vec<f32>,
    allowed: usize,
}

impl DecodingMask {
    /// Mask for decode position `offset`: the last `offset + 1` entries are open.
    pub fn at_offset(offset: usize) -> Self {
        let allowed = (offset + 1).min(N_TEXT_CTX);
        let mut values = vec![f32::NEG_INFINITY; N_TEXT_CTX];
        values[N_TEXT_CTX - allowed..].fill(0.0);

        Self { values, allowed }
    }

    /// Open one more position. Saturates once the whole window is open.
    pub fn advance(&mut self) {
        if self.allowed < self.values.len() {
            self.allowed += 1;
            let index = self.values.len() - self.allowed;
            self.values[index] = 0.0;
        }
    }

    /// Number of zero entries.
    pub fn allowed(&self) -> usize {
        self.allowed
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Why decoding stopped. Neither reason is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The model selected end-of-transcript.
    EndOfTranscript,
    /// The loop emitted `N_TEXT_CTX - 4` tokens without selecting EOT.
    ContextExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::EndOfTranscript => f.write_str("end of transcript"),
            Termination::ContextExhausted => f.write_str("context exhausted"),
        }
    }
}

/// Decoder lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeState {
    Init,
    FirstStep,
    Loop,
    Terminated(Termination),
}

/// Greedy decode bookkeeping: position, mask, pending token, output.
///
/// Holds no tensors, so termination and bounds are checkable without a
/// runtime. After each accepted step `mask().allowed() == offset() + 1`
/// until the window is full.
#[derive(Clone, Debug)]
pub struct DecodeCursor {
    offset: usize,
    mask: DecodingMask,
    next_token: u32,
    tokens: Vec<u32>,
    steps: usize,
}

impl DecodeCursor {
    /// Select the first token from the decoder-main logits.
    ///
    /// First-step suppression is applied to `logits` in place.
    pub fn start(logits: &mut [f32]) -> Result<Self> {
        suppress_tokens(logits, true);
        let next_token = argmax(logits)?;

        Ok(Self {
            offset: SotSequence::LEN,
            mask: DecodingMask::at_offset(SotSequence::LEN),
            next_token,
            tokens: Vec::with_capacity(MAX_GENERATED_TOKENS),
            steps: 0,
        })
    }

    /// Accept the pending token for the next loop step, or stop.
    ///
    /// An EOT is never appended to the output. A token selected after the
    /// last permitted step is discarded.
    pub fn begin_step(&mut self) -> ControlFlow<Termination, u32> {
        if self.next_token == EOT {
            return ControlFlow::Break(Termination::EndOfTranscript);
        }
        if self.steps >= MAX_GENERATED_TOKENS {
            return ControlFlow::Break(Termination::ContextExhausted);
        }

        self.tokens.push(self.next_token);
        ControlFlow::Continue(self.next_token)
    }

    /// Select the following token from decoder-loop logits and move forward.
    pub fn finish_step(&mut self, logits: &mut [f32]) -> Result<()> {
        suppress_tokens(logits, false);
        self.next_token = argmax(logits)?;

        self.offset += 1;
        self.mask.advance();
        self.steps += 1;

        tracing::trace!(offset = self.offset, allowed = self.mask.allowed());
        Ok(())
    }

    /// Position of the next loop step in the context window.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn mask(&self) -> &DecodingMask {
        &self.mask
    }

    pub fn next_token(&self) -> u32 {
        self.next_token
    }

    /// Tokens emitted so far, prefix and EOT excluded.
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    /// Number of decoder-loop runs.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn into_tokens(self) -> Vec<u32> {
        self.tokens
    }
}

/// Timing of one decode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecodeStats {
    /// Encoder run.
    pub encode: Duration,
    /// Decoder-main run and first selection.
    pub first_token: Duration,
    /// All decoder-loop steps.
    pub loop_time: Duration,
    /// Decoder-loop runs.
    pub steps: usize,
}

impl DecodeStats {
    /// Selections (first step plus loop steps) per second of decoder time.
    pub fn tokens_per_sec(&self) -> f64 {
        let elapsed = (self.first_token + self.loop_time).as_secs_f64();
        if elapsed > 0.0 {
            (self.steps + 1) as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Result of a completed decode.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeOutput {
    /// Emitted tokens in order, without prefix or EOT.
    pub tokens: Vec<u32>,
    pub termination: Termination,
    pub stats: DecodeStats,
}

/// Phase data carried between transitions.
enum Phase<T> {
    Init,
    FirstStep {
        cross: CrossAttentionCache<T>,
    },
    Loop {
        cross: CrossAttentionCache<T>,
        cache: SelfAttentionCache<T>,
        cursor: DecodeCursor,
    },
    Terminated {
        cursor: DecodeCursor,
        reason: Termination,
    },
}

impl<T> Phase<T> {
    fn state(&self) -> DecodeState {
        match self {
            Phase::Init => DecodeState::Init,
            Phase::FirstStep { .. } => DecodeState::FirstStep,
            Phase::Loop { .. } => DecodeState::Loop,
            Phase::Terminated { reason, .. } => DecodeState::Terminated(*reason),
        }
    }
}

/// Greedy decoder owning the encoder, decoder-main and decoder-loop stages.
///
/// Stages are prepared and their wiring verified at construction. A decoder
/// is reusable: each call to [`decode`](Self::decode) starts from `Init`.
pub struct GreedyDecoder<R: StageRunner> {
    encoder: EncoderStage<R>,
    main: DecoderMainStage<R>,
    looped: DecoderLoopStage<R>,
    positional: PositionalEmbedding,
    dump_dir: Option<PathBuf>,
}

impl<R: StageRunner> GreedyDecoder<R> {
    /// Prepare the three stages and check they chain together.
    ///
    /// # Errors
    ///
    /// Fails if any stage cannot be prepared or a tensor passed between
    /// stages (or fed from the host) does not fit its slot.
    pub fn new(encoder: R, main: R, looped: R, positional: PositionalEmbedding) -> Result<Self> {
        let encoder = EncoderStage::new(encoder)?;
        let main = DecoderMainStage::new(main)?;
        let looped = DecoderLoopStage::new(looped)?;

        check_wiring(&encoder, &main, &looped, positional.width())?;

        Ok(Self {
            encoder,
            main,
            looped,
            positional,
            dump_dir: None,
        })
    }

    /// Dump mel, cross-attention and first-step logits into `dir` on each decode.
    ///
    /// The encoder then returns its outputs in host memory.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.encoder.keep_outputs_on_host();
        self.dump_dir = Some(dir.into());
        self
    }

    /// Decode one 30 s window.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the decode; no partial output is returned.
    pub fn decode(&mut self, mel: &MelSpectrogram, sot: SotSequence) -> Result<DecodeOutput> {
        let mut stats = DecodeStats::default();
        let mut phase = Phase::Init;

        loop {
            tracing::trace!(state = ?phase.state());

            phase = match phase {
                Phase::Init => {
                    let start = Instant::now();
                    let cross = self.encoder.encode(mel)?;
                    stats.encode = start.elapsed();

                    if let Some(dir) = &self.dump_dir {
                        self.dump_encoder(dir, mel, &cross)?;
                    }

                    tracing::debug!(elapsed_ms = stats.encode.as_millis(), "encoder finished");
                    Phase::FirstStep { cross }
                }

                Phase::FirstStep { cross } => {
                    let start = Instant::now();
                    let (mut logits, cache) = self.main.run(&sot, &cross)?;
                    let cursor = DecodeCursor::start(&mut logits)?;
                    stats.first_token = start.elapsed();

                    if let Some(dir) = &self.dump_dir {
                        diagnostics::dump_f32(dir, "logits.bin", &logits)?;
                    }

                    tracing::debug!(
                        token = cursor.next_token(),
                        elapsed_ms = stats.first_token.as_millis(),
                        "first token"
                    );
                    Phase::Loop {
                        cross,
                        cache,
                        cursor,
                    }
                }

                Phase::Loop {
                    cross,
                    cache,
                    mut cursor,
                } => match cursor.begin_step() {
                    ControlFlow::Break(reason) => Phase::Terminated { cursor, reason },
                    ControlFlow::Continue(token) => {
                        let start = Instant::now();
                        let offset = cursor.offset();
                        let row = self.positional.row(offset).ok_or_else(|| {
                            AcceleratorError::ShapeMismatch {
                                name: "positional embedding".to_string(),
                                expected: format!("row below {N_TEXT_CTX}"),
                                got: format!("row {offset}"),
                            }
                        })?;

                        let mask = cursor.mask().as_slice();
                        let (mut logits, cache) =
                            self.looped.step(token, &cache, &cross, row, mask)?;
                        cursor.finish_step(&mut logits)?;

                        let elapsed = start.elapsed();
                        stats.loop_time += elapsed;
                        tracing::debug!(
                            token,
                            next = cursor.next_token(),
                            offset,
                            elapsed_ms = elapsed.as_millis(),
                            "decoded"
                        );

                        Phase::Loop {
                            cross,
                            cache,
                            cursor,
                        }
                    }
                },

                Phase::Terminated { cursor, reason } => {
                    stats.steps = cursor.steps();

                    tracing::info!(
                        tokens = cursor.tokens().len(),
                        %reason,
                        first_token_ms = stats.first_token.as_millis(),
                        loop_ms = stats.loop_time.as_millis(),
                        tokens_per_sec = stats.tokens_per_sec(),
                        "decode finished"
                    );

                    return Ok(DecodeOutput {
                        tokens: cursor.into_tokens(),
                        termination: reason,
                        stats,
                    });
                }
            };
        }
    }

    fn dump_encoder(
        &self,
        dir: &Path,
        mel: &MelSpectrogram,
        cross: &CrossAttentionCache<R::Tensor>,
    ) -> Result<()> {
        let runner = self.encoder.runner();

        diagnostics::dump_f32(dir, "mel.bin", &mel.to_row_major_vec())?;

        let key = runner.download(&cross.key)?.into_f32("cross_k")?;
        diagnostics::dump_f32(dir, "n_layer_cross_k.bin", &key)?;

        let value = runner.download(&cross.value)?.into_f32("cross_v")?;
        diagnostics::dump_f32(dir, "n_layer_cross_v.bin", &value)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{BLANK, VOCAB_SIZE};

    fn logits_peaking_at(token: u32) -> Vec<f32> {
        let mut logits = vec![0.0; VOCAB_SIZE];
        logits[token as usize] = 5.0;
        logits
    }

    #[test]
    fn initial_mask_opens_offset_plus_one() {
        let mask = DecodingMask::at_offset(4);
        let values = mask.as_slice();

        assert_eq!(values.len(), N_TEXT_CTX);
        assert_eq!(mask.allowed(), 5);
        assert!(values[..N_TEXT_CTX - 5].iter().all(|x| *x == f32::NEG_INFINITY));
        assert!(values[N_TEXT_CTX - 5..].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn mask_advance_opens_suffix_and_saturates() {
        let mut mask = DecodingMask::at_offset(4);
        for _ in 0..1000 {
            mask.advance();
        }

        assert_eq!(mask.allowed(), N_TEXT_CTX);
        assert!(mask.as_slice().iter().all(|x| *x == 0.0));
        assert_eq!(DecodingMask::at_offset(N_TEXT_CTX + 10).allowed(), N_TEXT_CTX);
    }

    #[test]
    fn first_step_never_picks_eot_or_blank() {
        let mut logits = logits_peaking_at(EOT);
        logits[BLANK as usize] = 4.0;
        logits[1000] = 1.0;

        let cursor = DecodeCursor::start(&mut logits).unwrap();

        assert_eq!(cursor.next_token(), 1000);
        assert_eq!(cursor.offset(), 4);
        assert_eq!(cursor.mask().allowed(), 5);
    }

    #[test]
    fn eot_terminates_without_being_emitted() {
        let mut cursor = DecodeCursor::start(&mut logits_peaking_at(7)).unwrap();

        assert_eq!(cursor.begin_step(), ControlFlow::Continue(7));
        cursor.finish_step(&mut logits_peaking_at(EOT)).unwrap();

        assert_eq!(
            cursor.begin_step(),
            ControlFlow::Break(Termination::EndOfTranscript)
        );
        assert_eq!(cursor.tokens(), &[7]);
        assert_eq!(cursor.steps(), 1);
    }

    #[test]
    fn mask_tracks_offset_every_step() {
        let mut cursor = DecodeCursor::start(&mut logits_peaking_at(9)).unwrap();

        while let ControlFlow::Continue(_) = cursor.begin_step() {
            assert_eq!(cursor.mask().allowed(), cursor.offset() + 1);
            assert!(cursor.offset() < N_TEXT_CTX);
            cursor.finish_step(&mut logits_peaking_at(9)).unwrap();
        }
    }

    #[test]
    fn loop_is_bounded_by_context() {
        let mut cursor = DecodeCursor::start(&mut logits_peaking_at(11)).unwrap();

        let reason = loop {
            match cursor.begin_step() {
                ControlFlow::Continue(_) => cursor.finish_step(&mut logits_peaking_at(11)).unwrap(),
                ControlFlow::Break(reason) => break reason,
            }
        };

        assert_eq!(reason, Termination::ContextExhausted);
        assert_eq!(cursor.steps(), MAX_GENERATED_TOKENS);
        assert_eq!(cursor.tokens().len(), MAX_GENERATED_TOKENS);
        assert_eq!(cursor.offset(), N_TEXT_CTX);
        assert_eq!(cursor.mask().allowed(), N_TEXT_CTX);
    }

    #[test]
    fn tokens_per_sec_counts_first_selection() {
        let stats = DecodeStats {
            encode: Duration::from_millis(500),
            first_token: Duration::from_millis(100),
            loop_time: Duration::from_millis(900),
            steps: 9,
        };

        assert!((stats.tokens_per_sec() - 10.0).abs() < 1e-9);
        assert_eq!(DecodeStats::default().tokens_per_sec(), 0.0);
    }
}
