//! Tensor handles exchanged between the host and stage runners.
//!
//! Stage inputs and outputs are described by a [`TensorSpec`] (name, shape,
//! element type). Data lives either in a [`HostTensor`] or in a runner-owned
//! handle that never leaves the runtime unless explicitly downloaded. Every
//! binding of a handle to a stage slot is checked against the slot's spec, so
//! no caller ever computes byte counts by hand.

use crate::error::AcceleratorError;
use std::fmt;

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
    F32,
    I32,
    I64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 => 4,
            ElementType::I64 => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, ElementType::I32 | ElementType::I64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::F32 => "f32",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
        };
        f.write_str(name)
    }
}

/// Where a tensor's backing store lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Ordinary process memory
    Host,
    /// Memory owned by the accelerator runtime
    Device,
}

/// Declared layout of a stage input or output slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub element_type: ElementType,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            shape,
            element_type,
        }
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_size(&self) -> usize {
        self.num_elements() * self.element_type.size()
    }

    /// Check that a tensor produced for `other` can be bound to this slot.
    ///
    /// Slots are compatible when element type and element count agree; the
    /// runtimes treat buffers of equal size as reshapeable.
    pub fn ensure_accepts(&self, other: &TensorSpec) -> Result<(), AcceleratorError> {
        if self.element_type != other.element_type || self.num_elements() != other.num_elements()
        {
            return Err(AcceleratorError::ShapeMismatch {
                name: format!("{} <- {}", self.name, other.name),
                expected: self.describe(),
                got: other.describe(),
            });
        }

        Ok(())
    }

    /// Check that a handle fits this slot.
    pub fn ensure_fits<T: TensorHandle + ?Sized>(
        &self,
        tensor: &T,
    ) -> Result<(), AcceleratorError> {
        let count: usize = tensor.shape().iter().product();
        let types_agree = self.element_type == tensor.element_type()
            || (self.element_type.is_integer() && tensor.element_type().is_integer());

        if !types_agree || count != self.num_elements() {
            return Err(AcceleratorError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.describe(),
                got: format!("{}{:?}", tensor.element_type(), tensor.shape()),
            });
        }

        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}{:?}", self.element_type, self.shape)
    }
}

/// Common view over host and runner-owned tensors.
pub trait TensorHandle {
    fn shape(&self) -> &[usize];
    fn element_type(&self) -> ElementType;
    fn placement(&self) -> Placement;

    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Host-side tensor data.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Tensor in ordinary process memory.
#[derive(Clone, Debug, PartialEq)]
pub struct HostTensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl HostTensor {
    pub fn f32(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            shape,
            data: TensorData::F32(data),
        }
    }

    pub fn i32(shape: Vec<usize>, data: Vec<i32>) -> Self {
        Self {
            shape,
            data: TensorData::I32(data),
        }
    }

    /// Float contents, if this is an f32 tensor.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Consume into float contents, or report the slot name on type mismatch.
    pub fn into_f32(self, name: &str) -> Result<Vec<f32>, AcceleratorError> {
        match self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(AcceleratorError::ShapeMismatch {
                name: name.to_string(),
                expected: "f32".to_string(),
                got: TensorData::type_of(&other).to_string(),
            }),
        }
    }

    /// Convert integer data to the requested integer width.
    ///
    /// Token ids are produced as i32; some exports declare i64 inputs.
    pub fn cast_integers(self, target: ElementType) -> Self {
        let data = match (self.data, target) {
            (TensorData::I32(v), ElementType::I64) => {
                TensorData::I64(v.into_iter().map(i64::from).collect())
            }
            (TensorData::I64(v), ElementType::I32) => {
                TensorData::I32(v.into_iter().map(|x| x as i32).collect())
            }
            (data, _) => data,
        };

        Self {
            shape: self.shape,
            data,
        }
    }
}

impl TensorData {
    fn type_of(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I32(_) => ElementType::I32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TensorHandle for HostTensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn element_type(&self) -> ElementType {
        self.data.type_of()
    }

    fn placement(&self) -> Placement {
        Placement::Host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_reports_byte_size() {
        let spec = TensorSpec::new("mask", vec![448], ElementType::F32);
        assert_eq!(spec.num_elements(), 448);
        assert_eq!(spec.byte_size(), 1792);

        let tokens = TensorSpec::new("tokens", vec![1, 4], ElementType::I64);
        assert_eq!(tokens.byte_size(), 32);
    }

    #[test]
    fn accepts_reshaped_buffer_of_same_size() {
        let slot = TensorSpec::new("self_k_in", vec![12, 448, 768], ElementType::F32);
        let produced = TensorSpec::new("self_k_out", vec![12, 1, 448, 768], ElementType::F32);

        assert!(slot.ensure_accepts(&produced).is_ok());
    }

    #[test]
    fn rejects_size_or_type_mismatch() {
        let slot = TensorSpec::new("cross_k", vec![4, 1500, 384], ElementType::F32);
        let bigger = TensorSpec::new("cross_k", vec![12, 1500, 768], ElementType::F32);
        let ints = TensorSpec::new("cross_k", vec![4, 1500, 384], ElementType::I32);

        assert!(matches!(
            slot.ensure_accepts(&bigger),
            Err(AcceleratorError::ShapeMismatch { .. })
        ));
        assert!(slot.ensure_accepts(&ints).is_err());
    }

    #[test]
    fn integer_slots_accept_either_width() {
        let slot = TensorSpec::new("tokens", vec![1, 1], ElementType::I64);
        let host = HostTensor::i32(vec![1, 1], vec![50258]);

        assert!(slot.ensure_fits(&host).is_ok());
        assert_eq!(
            host.cast_integers(ElementType::I64).data,
            TensorData::I64(vec![50258])
        );
    }

    #[test]
    fn host_tensor_is_host_placed() {
        let host = HostTensor::f32(vec![2, 3], vec![0.0; 6]);

        assert_eq!(host.placement(), Placement::Host);
        assert_eq!(host.num_elements(), 6);
        assert!(host.clone().into_f32("x").is_ok());
        assert!(HostTensor::i32(vec![1], vec![1]).into_f32("x").is_err());
    }
}
