//! Logit suppression and greedy token selection.

use crate::error::Result;
use crate::tokens::{BLANK, EOT, NO_SPEECH, NO_TIMESTAMPS, SOT, TRANSLATE};
use ndarray::ArrayView1;
use ndarray_stats::QuantileExt;

/// Tokens masked on every step.
pub const ALWAYS_SUPPRESSED: [u32; 4] = [NO_TIMESTAMPS, SOT, NO_SPEECH, TRANSLATE];

/// Tokens additionally masked on the first step, so the transcript cannot
/// end or start with a bare space immediately.
pub const INITIAL_SUPPRESSED: [u32; 2] = [EOT, BLANK];

/// Set disallowed token logits to negative infinity in place.
///
/// Ids beyond the end of `logits` are ignored.
pub fn suppress_tokens(logits: &mut [f32], is_initial: bool) {
    let initial: &[u32] = if is_initial { &INITIAL_SUPPRESSED } else { &[] };

    for &id in initial.iter().chain(&ALWAYS_SUPPRESSED) {
        if let Some(logit) = logits.get_mut(id as usize) {
            *logit = f32::NEG_INFINITY;
        }
    }
}

/// Index of the largest logit; the lowest index wins ties.
///
/// # Errors
///
/// Fails on an empty vector or when a NaN prevents ordering.
pub fn argmax(logits: &[f32]) -> Result<u32> {
    let index = ArrayView1::from(logits).argmax()?;
    Ok(index as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AcceleratorError, Error};
    use crate::tokens::VOCAB_SIZE;

    fn count_neg_inf(logits: &[f32]) -> usize {
        logits.iter().filter(|x| **x == f32::NEG_INFINITY).count()
    }

    #[test]
    fn first_step_masks_six_tokens() {
        let mut logits = vec![0.5; VOCAB_SIZE];
        suppress_tokens(&mut logits, true);

        assert_eq!(count_neg_inf(&logits), 6);
        for id in [EOT, BLANK, NO_TIMESTAMPS, SOT, NO_SPEECH, TRANSLATE] {
            assert_eq!(logits[id as usize], f32::NEG_INFINITY);
        }
    }

    #[test]
    fn later_steps_mask_four_tokens() {
        let mut logits = vec![0.5; VOCAB_SIZE];
        suppress_tokens(&mut logits, false);

        assert_eq!(count_neg_inf(&logits), 4);
        assert_eq!(logits[EOT as usize], 0.5);
        assert_eq!(logits[BLANK as usize], 0.5);
    }

    #[test]
    fn suppression_is_idempotent() {
        for is_initial in [true, false] {
            let mut once: Vec<f32> = (0..VOCAB_SIZE).map(|i| (i % 97) as f32).collect();
            suppress_tokens(&mut once, is_initial);

            let mut twice = once.clone();
            suppress_tokens(&mut twice, is_initial);

            assert_eq!(once, twice);
        }
    }

    #[test]
    fn short_vectors_are_left_alone_past_their_end() {
        let mut logits = vec![1.0; 300];
        suppress_tokens(&mut logits, true);

        assert_eq!(count_neg_inf(&logits), 1);
        assert_eq!(logits[BLANK as usize], f32::NEG_INFINITY);
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        let logits = [0.1, 3.0, -1.0, 3.0, 3.0, 2.9];
        assert_eq!(argmax(&logits).unwrap(), 1);

        let flat = vec![0.0; 10];
        assert_eq!(argmax(&flat).unwrap(), 0);
    }

    #[test]
    fn argmax_skips_suppressed_maximum() {
        let mut logits = vec![0.0; VOCAB_SIZE];
        logits[EOT as usize] = 10.0;
        logits[42] = 1.0;

        assert_eq!(argmax(&logits).unwrap(), EOT);

        suppress_tokens(&mut logits, true);
        assert_eq!(argmax(&logits).unwrap(), 42);
    }

    #[test]
    fn argmax_rejects_empty_logits() {
        assert!(matches!(
            argmax(&[]),
            Err(Error::Accelerator(AcceleratorError::InvalidLogits(_)))
        ));
    }
}
