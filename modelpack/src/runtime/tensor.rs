/*!
 Tensor data as stored in an archive: raw little-endian bytes plus the
 element type, shape, and strides describing how to view them.
*/

use std::{fmt::Display, rc::Rc};

use crate::util::device::Device;

/// The element type of a tensor, named in archives by its storage class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Float32,
    Float64,
    Float16,
    Int64,
    Int32,
    Int16,
    Int8,
    UInt8,
    Bool,
}

impl Dtype {
    /// Map a serialized storage class name, i.e. `FloatStorage`, to a variant
    pub fn from_storage_name(name: &str) -> Option<Self> {
        match name {
            "FloatStorage" => Some(Self::Float32),
            "DoubleStorage" => Some(Self::Float64),
            "HalfStorage" => Some(Self::Float16),
            "LongStorage" => Some(Self::Int64),
            "IntStorage" => Some(Self::Int32),
            "ShortStorage" => Some(Self::Int16),
            "CharStorage" => Some(Self::Int8),
            "ByteStorage" => Some(Self::UInt8),
            "BoolStorage" => Some(Self::Bool),
            _ => None,
        }
    }

    /// The width of one element, in bytes
    pub fn element_size(&self) -> usize {
        match self {
            Dtype::Float64 | Dtype::Int64 => 8,
            Dtype::Float32 | Dtype::Int32 => 4,
            Dtype::Float16 | Dtype::Int16 => 2,
            Dtype::Int8 | Dtype::UInt8 | Dtype::Bool => 1,
        }
    }
}

impl Display for Dtype {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dtype::Float32 => write!(fmt, "float32"),
            Dtype::Float64 => write!(fmt, "float64"),
            Dtype::Float16 => write!(fmt, "float16"),
            Dtype::Int64 => write!(fmt, "int64"),
            Dtype::Int32 => write!(fmt, "int32"),
            Dtype::Int16 => write!(fmt, "int16"),
            Dtype::Int8 => write!(fmt, "int8"),
            Dtype::UInt8 => write!(fmt, "uint8"),
            Dtype::Bool => write!(fmt, "bool"),
        }
    }
}

/// The raw bytes of one auxiliary storage record
///
/// A storage may back more than one tensor; the bytes are shared, never
/// copied per tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    pub dtype: Dtype,
    pub device: Device,
    pub data: Rc<Vec<u8>>,
}

/// A typed view over a storage
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub dtype: Dtype,
    pub shape: Vec<i64>,
    pub strides: Vec<i64>,
    /// Offset into the storage, in elements
    pub storage_offset: i64,
    pub requires_grad: bool,
    pub device: Device,
    storage: Rc<Vec<u8>>,
}

impl Tensor {
    /// Callers must have verified that the storage covers
    /// `storage_offset + numel` elements.
    pub(crate) fn new(
        dtype: Dtype,
        shape: Vec<i64>,
        strides: Vec<i64>,
        storage_offset: i64,
        requires_grad: bool,
        device: Device,
        storage: Rc<Vec<u8>>,
    ) -> Self {
        Self {
            dtype,
            shape,
            strides,
            storage_offset,
            requires_grad,
            device,
            storage,
        }
    }

    /// The number of elements described by the shape
    pub fn numel(&self) -> usize {
        self.shape.iter().product::<i64>().max(0) as usize
    }

    /// The bytes of this tensor's elements, assuming contiguous layout
    pub fn data(&self) -> &[u8] {
        let size = self.dtype.element_size();
        let start = self.storage_offset.max(0) as usize * size;
        &self.storage[start..start + self.numel() * size]
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::{
        runtime::tensor::{Dtype, Tensor},
        util::device::Device,
    };

    #[test]
    fn can_parse_storage_names() {
        assert!(matches!(
            Dtype::from_storage_name("FloatStorage"),
            Some(Dtype::Float32)
        ));
        assert!(matches!(
            Dtype::from_storage_name("LongStorage"),
            Some(Dtype::Int64)
        ));
        assert!(matches!(
            Dtype::from_storage_name("BoolStorage"),
            Some(Dtype::Bool)
        ));
    }

    #[test]
    fn cant_parse_unknown_storage_name() {
        assert!(Dtype::from_storage_name("ComplexFloatStorage").is_none());
        assert!(Dtype::from_storage_name("").is_none());
    }

    #[test]
    fn element_sizes_match_dtypes() {
        assert_eq!(Dtype::Float32.element_size(), 4);
        assert_eq!(Dtype::Float64.element_size(), 8);
        assert_eq!(Dtype::Float16.element_size(), 2);
        assert_eq!(Dtype::UInt8.element_size(), 1);
    }

    #[test]
    fn tensor_data_respects_offset_and_shape() {
        let storage: Vec<u8> = (0..12).collect();
        let tensor = Tensor::new(
            Dtype::Int16,
            vec![2, 2],
            vec![2, 1],
            1,
            false,
            Device::Cpu,
            Rc::new(storage),
        );

        assert_eq!(tensor.numel(), 4);
        assert_eq!(tensor.data(), &[2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn scalar_tensor_has_one_element() {
        let tensor = Tensor::new(
            Dtype::Float32,
            vec![],
            vec![],
            0,
            false,
            Device::Cpu,
            Rc::new(vec![0u8; 4]),
        );

        assert_eq!(tensor.numel(), 1);
        assert_eq!(tensor.data().len(), 4);
    }
}
