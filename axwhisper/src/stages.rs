//! Encoder, decoder-main, and decoder-loop stages.
//!
//! All three share the [`StageRunner`] lifecycle and differ only in tensor
//! layout. Layout indices are fixed by the model export:
//!
//! | stage | inputs | outputs |
//! |---|---|---|
//! | encoder | mel | cross_k, cross_v |
//! | decoder-main | tokens (4), cross_k, cross_v | logits (4 x vocab), self_k, self_v |
//! | decoder-loop | token (1), self_k, self_v, cross_k, cross_v, positional row, mask | logits (vocab), self_k, self_v |

use crate::error::{AcceleratorError, Result};
use crate::features::MelSpectrogram;
use crate::runner::StageRunner;
use crate::tensor::{HostTensor, TensorSpec};
use crate::tokens::{N_TEXT_CTX, SotSequence, VOCAB_SIZE};
use ndarray::ArrayView1;

/// Encoder output attended to by every decoder step. Never modified.
pub struct CrossAttentionCache<T> {
    pub key: T,
    pub value: T,
}

/// Accumulated decoder self-attention state, replaced after every step.
pub struct SelfAttentionCache<T> {
    pub key: T,
    pub value: T,
}

/// Take the first `N` outputs of a run.
fn take_outputs<T, const N: usize>(stage: &str, mut outputs: Vec<T>) -> Result<[T; N]> {
    if outputs.len() < N {
        return Err(AcceleratorError::MissingOutput {
            name: format!("{stage} output {}", outputs.len()),
        }
        .into());
    }

    outputs.truncate(N);
    outputs.try_into().map_err(|_| {
        AcceleratorError::MissingOutput {
            name: stage.to_string(),
        }
        .into()
    })
}

/// Download a logits tensor and keep its last `VOCAB_SIZE` entries.
fn last_logits<R: StageRunner>(
    runner: &R,
    tensor: &R::Tensor,
    positions: usize,
) -> Result<Vec<f32>> {
    let name = format!("{} logits", runner.name());
    let mut logits = runner.download(tensor)?.into_f32(&name)?;

    if logits.len() != positions * VOCAB_SIZE {
        return Err(AcceleratorError::ShapeMismatch {
            name,
            expected: format!("{} floats", positions * VOCAB_SIZE),
            got: format!("{} floats", logits.len()),
        }
        .into());
    }

    Ok(logits.split_off(logits.len() - VOCAB_SIZE))
}

pub struct EncoderStage<R> {
    runner: R,
}

impl<R: StageRunner> EncoderStage<R> {
    pub const MEL: usize = 0;
    pub const CROSS_K: usize = 0;
    pub const CROSS_V: usize = 1;

    /// Wrap a loaded runner, preparing it.
    pub fn new(mut runner: R) -> Result<Self> {
        runner.prepare()?;
        runner.keep_resident(&[Self::CROSS_K, Self::CROSS_V]);
        Ok(Self { runner })
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Return the cross-attention tensors in host memory, so they can be read
    /// back for diagnostics.
    pub fn keep_outputs_on_host(&mut self) {
        self.runner.keep_resident(&[]);
    }

    /// Run the encoder once, leaving the cross-attention tensors in the runtime.
    pub fn encode(&mut self, mel: &MelSpectrogram) -> Result<CrossAttentionCache<R::Tensor>> {
        let input = self.runner.upload(Self::MEL, mel.to_host_tensor())?;
        let outputs = self.runner.run(&[&input])?;
        let [key, value] = take_outputs(self.runner.name(), outputs)?;

        Ok(CrossAttentionCache { key, value })
    }
}

pub struct DecoderMainStage<R> {
    runner: R,
}

impl<R: StageRunner> DecoderMainStage<R> {
    pub const TOKENS: usize = 0;
    pub const CROSS_K: usize = 1;
    pub const CROSS_V: usize = 2;

    pub const LOGITS: usize = 0;
    pub const SELF_K: usize = 1;
    pub const SELF_V: usize = 2;

    pub fn new(mut runner: R) -> Result<Self> {
        runner.prepare()?;
        runner.keep_resident(&[Self::SELF_K, Self::SELF_V]);
        Ok(Self { runner })
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the prefix through the decoder.
    ///
    /// Returns the logits of the last prefix position and the initial
    /// self-attention cache.
    pub fn run(
        &mut self,
        sot: &SotSequence,
        cross: &CrossAttentionCache<R::Tensor>,
    ) -> Result<(Vec<f32>, SelfAttentionCache<R::Tensor>)> {
        let tokens = HostTensor::i32(vec![1, SotSequence::LEN], sot.to_i32_vec());
        let tokens = self.runner.upload(Self::TOKENS, tokens)?;

        let outputs = self.runner.run(&[&tokens, &cross.key, &cross.value])?;
        let [logits, key, value] = take_outputs(self.runner.name(), outputs)?;

        let logits = last_logits(&self.runner, &logits, SotSequence::LEN)?;
        Ok((logits, SelfAttentionCache { key, value }))
    }
}

pub struct DecoderLoopStage<R> {
    runner: R,
}

impl<R: StageRunner> DecoderLoopStage<R> {
    pub const TOKEN: usize = 0;
    pub const SELF_K: usize = 1;
    pub const SELF_V: usize = 2;
    pub const CROSS_K: usize = 3;
    pub const CROSS_V: usize = 4;
    pub const POSITIONAL: usize = 5;
    pub const MASK: usize = 6;

    pub const LOGITS: usize = 0;
    pub const SELF_K_OUT: usize = 1;
    pub const SELF_V_OUT: usize = 2;

    pub fn new(mut runner: R) -> Result<Self> {
        runner.prepare()?;
        runner.keep_resident(&[Self::SELF_K_OUT, Self::SELF_V_OUT]);
        Ok(Self { runner })
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Decode one token.
    ///
    /// Returns the next-token logits and the updated self-attention cache,
    /// which replaces `cache` as input to the following step.
    pub fn step(
        &mut self,
        token: u32,
        cache: &SelfAttentionCache<R::Tensor>,
        cross: &CrossAttentionCache<R::Tensor>,
        positional: ArrayView1<'_, f32>,
        mask: &[f32],
    ) -> Result<(Vec<f32>, SelfAttentionCache<R::Tensor>)> {
        let token = self
            .runner
            .upload(Self::TOKEN, HostTensor::i32(vec![1, 1], vec![token as i32]))?;
        let positional = self.runner.upload(
            Self::POSITIONAL,
            HostTensor::f32(vec![positional.len()], positional.to_vec()),
        )?;
        let mask = self
            .runner
            .upload(Self::MASK, HostTensor::f32(vec![mask.len()], mask.to_vec()))?;

        let outputs = self.runner.run(&[
            &token,
            &cache.key,
            &cache.value,
            &cross.key,
            &cross.value,
            &positional,
            &mask,
        ])?;
        let [logits, key, value] = take_outputs(self.runner.name(), outputs)?;

        let logits = last_logits(&self.runner, &logits, 1)?;
        Ok((logits, SelfAttentionCache { key, value }))
    }
}

/// Check that a stage declares exactly `inputs` inputs and `outputs` outputs.
fn expect_slots<R: StageRunner>(runner: &R, inputs: usize, outputs: usize) -> Result<()> {
    let declared = (runner.input_count()?, runner.output_count()?);

    if declared != (inputs, outputs) {
        return Err(AcceleratorError::ShapeMismatch {
            name: runner.name().to_string(),
            expected: format!("{inputs} inputs and {outputs} outputs"),
            got: format!("{} inputs and {} outputs", declared.0, declared.1),
        }
        .into());
    }
    Ok(())
}

/// Check that a slot holds exactly `elements` values of the right kind.
fn expect_elements(spec: &TensorSpec, elements: usize, integer: bool) -> Result<()> {
    if spec.num_elements() != elements || spec.element_type.is_integer() != integer {
        return Err(AcceleratorError::ShapeMismatch {
            name: spec.name.clone(),
            expected: format!(
                "{elements} {} elements",
                if integer { "integer" } else { "float" }
            ),
            got: format!("{}{:?}", spec.element_type, spec.shape),
        }
        .into());
    }
    Ok(())
}

/// Verify that the three prepared stages can be chained.
///
/// Each stage must declare exactly the slots listed in the module table. Every
/// tensor handed from one stage to another must fit the receiving slot, and
/// the host-fed slots must match the prefix, vocabulary, context window and
/// positional embedding width.
pub fn check_wiring<R: StageRunner>(
    encoder: &EncoderStage<R>,
    main: &DecoderMainStage<R>,
    looped: &DecoderLoopStage<R>,
    hidden_width: usize,
) -> Result<()> {
    type Enc<S> = EncoderStage<S>;
    type Main<S> = DecoderMainStage<S>;
    type Loop<S> = DecoderLoopStage<S>;

    let enc = &encoder.runner;
    let main_r = &main.runner;
    let loop_r = &looped.runner;

    expect_slots(enc, 1, 2)?;
    expect_slots(main_r, 3, 3)?;
    expect_slots(loop_r, 7, 3)?;

    let cross_k = enc.output_spec(Enc::<R>::CROSS_K)?;
    let cross_v = enc.output_spec(Enc::<R>::CROSS_V)?;

    main_r.input_spec(Main::<R>::CROSS_K)?.ensure_accepts(cross_k)?;
    main_r.input_spec(Main::<R>::CROSS_V)?.ensure_accepts(cross_v)?;
    loop_r.input_spec(Loop::<R>::CROSS_K)?.ensure_accepts(cross_k)?;
    loop_r.input_spec(Loop::<R>::CROSS_V)?.ensure_accepts(cross_v)?;

    let self_k_in = loop_r.input_spec(Loop::<R>::SELF_K)?;
    let self_v_in = loop_r.input_spec(Loop::<R>::SELF_V)?;

    self_k_in.ensure_accepts(main_r.output_spec(Main::<R>::SELF_K)?)?;
    self_v_in.ensure_accepts(main_r.output_spec(Main::<R>::SELF_V)?)?;
    self_k_in.ensure_accepts(loop_r.output_spec(Loop::<R>::SELF_K_OUT)?)?;
    self_v_in.ensure_accepts(loop_r.output_spec(Loop::<R>::SELF_V_OUT)?)?;

    expect_elements(main_r.input_spec(Main::<R>::TOKENS)?, SotSequence::LEN, true)?;
    expect_elements(
        main_r.output_spec(Main::<R>::LOGITS)?,
        SotSequence::LEN * VOCAB_SIZE,
        false,
    )?;

    expect_elements(loop_r.input_spec(Loop::<R>::TOKEN)?, 1, true)?;
    expect_elements(loop_r.input_spec(Loop::<R>::POSITIONAL)?, hidden_width, false)?;
    expect_elements(loop_r.input_spec(Loop::<R>::MASK)?, N_TEXT_CTX, false)?;
    expect_elements(loop_r.output_spec(Loop::<R>::LOGITS)?, VOCAB_SIZE, false)?;

    tracing::debug!(
        cross_k = cross_k.byte_size(),
        self_k = self_k_in.byte_size(),
        "stage wiring verified"
    );

    Ok(())
}
