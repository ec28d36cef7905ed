//! ONNX Runtime stage runner.
//!
//! Stages run through an ONNX Runtime I/O binding. Outputs marked resident are
//! bound to the execution provider's memory and handed to the next stage as-is;
//! every other output is bound to host memory so it can be read back.

use crate::error::{AcceleratorError, Result};
use crate::runner::StageRunner;
use crate::tensor::{ElementType, HostTensor, Placement, TensorData, TensorHandle, TensorSpec};
use ndarray::{ArrayD, IxDyn};
use ort::memory::{AllocationDevice, AllocatorType, MemoryInfo, MemoryType};
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::tensor::TensorElementType;
use ort::value::{DynTensor, DynTensorValueType, Tensor, ValueType};
use std::path::Path;
use std::time::Instant;

/// Memory that resident outputs are bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputDevice {
    pub device: AllocationDevice,
    pub device_id: i32,
}

impl OutputDevice {
    /// Host memory, used when no accelerator execution provider is configured.
    pub const HOST: OutputDevice = OutputDevice {
        device: AllocationDevice::CPU,
        device_id: 0,
    };

    pub const fn new(device: AllocationDevice, device_id: i32) -> Self {
        Self { device, device_id }
    }
}

impl Default for OutputDevice {
    fn default() -> Self {
        Self::HOST
    }
}

/// Tensor owned by ONNX Runtime.
pub struct OrtTensor {
    shape: Vec<usize>,
    element_type: ElementType,
    placement: Placement,
    value: DynTensor,
}

impl OrtTensor {
    fn new(spec: &TensorSpec, value: DynTensor) -> Self {
        Self {
            shape: spec.shape.clone(),
            element_type: spec.element_type,
            placement: placement_of(&value),
            value,
        }
    }
}

impl TensorHandle for OrtTensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn placement(&self) -> Placement {
        self.placement
    }
}

/// Stage runner backed by an ONNX Runtime session.
pub struct OrtRunner {
    name: String,
    session: Session,
    inputs: Vec<TensorSpec>,
    outputs: Vec<TensorSpec>,
    resident: Vec<usize>,
    device: OutputDevice,
    prepared: bool,
}

impl OrtRunner {
    /// Load a stage model from file.
    ///
    /// # Arguments
    ///
    /// * `builder` - ONNX session builder carrying execution provider settings
    /// * `path` - Model file
    pub fn load(builder: SessionBuilder, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let start = Instant::now();
        let session = builder
            .commit_from_file(path)
            .map_err(|source| AcceleratorError::Load {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            stage = %name,
            path = ?path.display(),
            elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
            "model loaded"
        );

        Ok(Self {
            name,
            session,
            inputs: Vec::new(),
            outputs: Vec::new(),
            resident: Vec::new(),
            device: OutputDevice::HOST,
            prepared: false,
        })
    }

    /// Bind resident outputs to `device` instead of host memory.
    ///
    /// Must match the session's execution provider, e.g.
    /// `AllocationDevice::CUDA` for the CUDA and TensorRT providers.
    pub fn with_output_device(mut self, device: OutputDevice) -> Self {
        self.device = device;
        self
    }

    fn ensure_prepared(&self) -> Result<()> {
        if !self.prepared {
            return Err(AcceleratorError::NotPrepared {
                stage: self.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn no_such_tensor(&self, direction: &'static str, index: usize) -> AcceleratorError {
        AcceleratorError::NoSuchTensor {
            stage: self.name.clone(),
            direction,
            index,
        }
    }
}

/// Build a spec from a declared value type, resolving dynamic dimensions to 1.
fn tensor_spec(stage: &str, name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let unsupported = || AcceleratorError::UnsupportedType {
        name: name.to_string(),
        ty: format!("{value_type:?}"),
    };

    let element_type = match value_type.tensor_type() {
        Some(TensorElementType::Float32) => ElementType::F32,
        Some(TensorElementType::Int32) => ElementType::I32,
        Some(TensorElementType::Int64) => ElementType::I64,
        _ => return Err(unsupported().into()),
    };

    let dims = value_type.tensor_shape().ok_or_else(unsupported)?;

    if dims.iter().any(|&d| d < 0) {
        tracing::warn!(stage, tensor = name, ?dims, "dynamic dimensions resolved to 1");
    }

    let shape = dims.iter().map(|&d| d.max(1) as usize).collect();

    Ok(TensorSpec::new(name, shape, element_type))
}

/// Build a runtime value for `spec` from host data, widening integers to the
/// slot's type.
fn host_value(spec: &TensorSpec, tensor: HostTensor) -> Result<DynTensor> {
    let shape = IxDyn(&spec.shape);
    let value = match tensor.cast_integers(spec.element_type).data {
        TensorData::F32(data) => {
            Tensor::from_array(ArrayD::from_shape_vec(shape, data)?)?.upcast()
        }
        TensorData::I32(data) => {
            Tensor::from_array(ArrayD::from_shape_vec(shape, data)?)?.upcast()
        }
        TensorData::I64(data) => {
            Tensor::from_array(ArrayD::from_shape_vec(shape, data)?)?.upcast()
        }
    };

    Ok(value)
}

fn placement_of(value: &DynTensor) -> Placement {
    if value.memory_info().is_cpu_accessible() {
        Placement::Host
    } else {
        Placement::Device
    }
}

fn extract<T>(value: &DynTensor) -> Result<(Vec<usize>, Vec<T>)>
where
    T: ort::tensor::PrimitiveTensorElementType + Copy + std::fmt::Debug,
{
    let view = value.try_extract_array::<T>()?;
    Ok((view.shape().to_vec(), view.iter().copied().collect()))
}

impl StageRunner for OrtRunner {
    type Tensor = OrtTensor;

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> Result<()> {
        self.inputs = self
            .session
            .inputs
            .iter()
            .map(|input| tensor_spec(&self.name, &input.name, &input.input_type))
            .collect::<Result<_>>()?;

        self.outputs = self
            .session
            .outputs
            .iter()
            .map(|output| tensor_spec(&self.name, &output.name, &output.output_type))
            .collect::<Result<_>>()?;

        for (index, spec) in self.inputs.iter().enumerate() {
            tracing::debug!(
                stage = %self.name,
                index,
                name = %spec.name,
                shape = ?spec.shape,
                bytes = spec.byte_size(),
                "input"
            );
        }
        for (index, spec) in self.outputs.iter().enumerate() {
            tracing::debug!(
                stage = %self.name,
                index,
                name = %spec.name,
                shape = ?spec.shape,
                bytes = spec.byte_size(),
                "output"
            );
        }

        self.prepared = true;
        Ok(())
    }

    fn keep_resident(&mut self, outputs: &[usize]) {
        self.resident = outputs.to_vec();
    }

    fn input_count(&self) -> Result<usize> {
        self.ensure_prepared()?;
        Ok(self.inputs.len())
    }

    fn output_count(&self) -> Result<usize> {
        self.ensure_prepared()?;
        Ok(self.outputs.len())
    }

    fn input_spec(&self, index: usize) -> Result<&TensorSpec> {
        self.ensure_prepared()?;
        self.inputs
            .get(index)
            .ok_or_else(|| self.no_such_tensor("input", index).into())
    }

    fn output_spec(&self, index: usize) -> Result<&TensorSpec> {
        self.ensure_prepared()?;
        self.outputs
            .get(index)
            .ok_or_else(|| self.no_such_tensor("output", index).into())
    }

    fn upload(&self, index: usize, tensor: HostTensor) -> Result<OrtTensor> {
        let spec = self.input_spec(index)?;
        spec.ensure_fits(&tensor)?;

        Ok(OrtTensor::new(spec, host_value(spec, tensor)?))
    }

    fn download(&self, tensor: &OrtTensor) -> Result<HostTensor> {
        if tensor.placement == Placement::Device {
            return Err(AcceleratorError::DeviceResident {
                stage: self.name.clone(),
            }
            .into());
        }

        let host = match tensor.element_type {
            ElementType::F32 => {
                let (shape, data) = extract::<f32>(&tensor.value)?;
                HostTensor::f32(shape, data)
            }
            ElementType::I32 => {
                let (shape, data) = extract::<i32>(&tensor.value)?;
                HostTensor::i32(shape, data)
            }
            ElementType::I64 => {
                let (shape, data) = extract::<i64>(&tensor.value)?;
                HostTensor {
                    shape,
                    data: TensorData::I64(data),
                }
            }
        };

        Ok(host)
    }

    fn run(&mut self, inputs: &[&OrtTensor]) -> Result<Vec<OrtTensor>> {
        self.ensure_prepared()?;

        if inputs.len() != self.inputs.len() {
            return Err(AcceleratorError::InputCount {
                stage: self.name.clone(),
                expected: self.inputs.len(),
                got: inputs.len(),
            }
            .into());
        }

        for (spec, tensor) in self.inputs.iter().zip(inputs) {
            spec.ensure_fits(*tensor)?;
        }

        // A fresh binding per run, so outputs never alias the previous step's cache.
        let mut binding = self.session.create_binding()?;

        for (spec, tensor) in self.inputs.iter().zip(inputs) {
            binding.bind_input(spec.name.as_str(), &tensor.value)?;
        }

        let host = MemoryInfo::new(
            AllocationDevice::CPU,
            0,
            AllocatorType::Device,
            MemoryType::Default,
        )?;
        let device = MemoryInfo::new(
            self.device.device,
            self.device.device_id,
            AllocatorType::Device,
            MemoryType::Default,
        )?;

        for (index, spec) in self.outputs.iter().enumerate() {
            let memory = if self.resident.contains(&index) {
                &device
            } else {
                &host
            };
            binding.bind_output_to_device(spec.name.as_str(), memory)?;
        }

        let mut outputs = self.session.run_binding(&binding)?;

        self.outputs
            .iter()
            .map(|spec| {
                let value = outputs
                    .remove(spec.name.as_str())
                    .ok_or_else(|| AcceleratorError::MissingOutput {
                        name: spec.name.clone(),
                    })?
                    .downcast::<DynTensorValueType>()?;

                Ok(OrtTensor::new(spec, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ort::tensor::{Shape, SymbolicDimensions};

    fn declared(ty: TensorElementType, dims: &[i64]) -> ValueType {
        ValueType::Tensor {
            ty,
            shape: Shape::new(dims.iter().copied()),
            dimension_symbols: SymbolicDimensions::empty(dims.len()),
        }
    }

    #[test]
    fn dynamic_dimensions_resolve_to_one() {
        let spec = tensor_spec(
            "decoder-loop",
            "self_k",
            &declared(TensorElementType::Float32, &[12, -1, 448, 768]),
        )
        .unwrap();

        assert_eq!(spec.shape, vec![12, 1, 448, 768]);
        assert_eq!(spec.element_type, ElementType::F32);
    }

    #[test]
    fn maps_supported_element_types() {
        let cases = [
            (TensorElementType::Float32, ElementType::F32),
            (TensorElementType::Int32, ElementType::I32),
            (TensorElementType::Int64, ElementType::I64),
        ];

        for (declared_type, expected) in cases {
            let spec = tensor_spec("encoder", "x", &declared(declared_type, &[1, 4])).unwrap();
            assert_eq!(spec.element_type, expected);
        }
    }

    #[test]
    fn rejects_unsupported_element_types() {
        for ty in [TensorElementType::Float64, TensorElementType::Float16] {
            let err = tensor_spec("encoder", "mel", &declared(ty, &[1, 80, 3000])).unwrap_err();
            assert!(matches!(
                err,
                crate::Error::Accelerator(AcceleratorError::UnsupportedType { .. })
            ));
        }
    }

    #[test]
    fn host_integers_widen_to_i64_slots() {
        let spec = TensorSpec::new("tokens", vec![1, 4], ElementType::I64);
        let value = host_value(&spec, HostTensor::i32(vec![4], vec![50258, 50260, 50359, 50363]))
            .unwrap();

        let (shape, data) = extract::<i64>(&value).unwrap();
        assert_eq!(shape, vec![1, 4]);
        assert_eq!(data, vec![50258, 50260, 50359, 50363]);
    }

    #[test]
    fn host_values_report_host_placement() {
        let spec = TensorSpec::new("mask", vec![448], ElementType::F32);
        let value = host_value(&spec, HostTensor::f32(vec![448], vec![0.0; 448])).unwrap();

        let tensor = OrtTensor::new(&spec, value);
        assert_eq!(tensor.placement(), Placement::Host);
    }

    #[test]
    fn host_memory_is_cpu_accessible() {
        let memory = MemoryInfo::new(
            OutputDevice::HOST.device,
            OutputDevice::HOST.device_id,
            AllocatorType::Device,
            MemoryType::Default,
        )
        .unwrap();

        assert!(memory.is_cpu_accessible());
        assert_eq!(OutputDevice::default(), OutputDevice::HOST);
    }
}
