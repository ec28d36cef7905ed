//! Stage runner contract.
//!
//! Each model stage (encoder, decoder-main, decoder-loop) is executed by a
//! runner with the same lifecycle: load (the runner's constructor), prepare,
//! then any number of synchronous runs. Runners own every runtime-resident
//! buffer; callers only move handles between stage outputs and inputs.

pub mod ort;

use crate::error::Result;
use crate::tensor::{HostTensor, TensorHandle, TensorSpec};

pub use self::ort::{OrtRunner, OrtTensor, OutputDevice};

/// Accelerator runner for one compiled model stage.
pub trait StageRunner {
    /// Runner-owned tensor handle.
    type Tensor: TensorHandle;

    /// Stage name used in diagnostics.
    fn name(&self) -> &str;

    /// Resolve input and output tensor layouts. Must be called before `run`.
    fn prepare(&mut self) -> Result<()>;

    /// Keep the outputs at `outputs` in accelerator memory after each run.
    ///
    /// Every other output comes back host-readable. Replaces any earlier
    /// selection; runners without accelerator memory ignore it.
    fn keep_resident(&mut self, outputs: &[usize]) {
        let _ = outputs;
    }

    /// Number of declared inputs.
    fn input_count(&self) -> Result<usize>;

    /// Number of declared outputs.
    fn output_count(&self) -> Result<usize>;

    /// Layout of the input slot at `index`.
    fn input_spec(&self, index: usize) -> Result<&TensorSpec>;

    /// Layout of the output slot at `index`.
    fn output_spec(&self, index: usize) -> Result<&TensorSpec>;

    /// Copy host data into a runner tensor bound for input slot `index`.
    fn upload(&self, index: usize, tensor: HostTensor) -> Result<Self::Tensor>;

    /// Copy a runner tensor back to host memory.
    fn download(&self, tensor: &Self::Tensor) -> Result<HostTensor>;

    /// Execute the stage synchronously.
    ///
    /// `inputs` are in declaration order; outputs are returned in declaration
    /// order. A failed run leaves no partial outputs behind.
    fn run(&mut self, inputs: &[&Self::Tensor]) -> Result<Vec<Self::Tensor>>;
}
