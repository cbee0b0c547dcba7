use indexmap::IndexMap;
use ndarray::{ArrayView, IxDyn};
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::{ArrayElement, DataType, data_type::with_element_type};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error(
        "Size mismatch: tensor of shape {shape:?} and data type \
        {data_type:?} expected to be {expected_size} bytes, got {actual_size} bytes."
    )]
    SizeMismatch {
        data_type: DataType,
        shape: Box<[usize]>,
        expected_size: usize,
        actual_size: usize,
    },
    #[error("Cannot reshape tensor of shape {from:?} into {to:?}")]
    ReshapeMismatch {
        from: Box<[usize]>,
        to: Box<[usize]>,
    },
    #[error("Cannot combine tensors of shapes {left:?} and {right:?}")]
    ShapeMismatch {
        left: Box<[usize]>,
        right: Box<[usize]>,
    },
    #[error("Tensor of type {from:?} holds a value not representable as {to:?}")]
    UnrepresentableValue {
        from: DataType,
        to: DataType,
    },
}

/// Flat name to tensor mapping, in insertion order.
pub type TensorMap = IndexMap<String, Tensor>;

pub fn size_for_shape(
    shape: &[usize],
    data_type: DataType,
) -> usize {
    shape.iter().product::<usize>() * data_type.size_in_bytes()
}

/// Byte storage aligned to 8 bytes so it can be viewed as any element type.
#[derive(Debug, Clone, PartialEq)]
struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBytes {
    fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(size_of::<u64>())],
            len,
        }
    }

    fn copy_from(bytes: &[u8]) -> Self {
        let mut storage = Self::zeroed(bytes.len());
        storage.as_bytes_mut().copy_from_slice(bytes);
        storage
    }

    fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

/// Owned host tensor with an explicit element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    bytes: AlignedBytes,
    shape: Box<[usize]>,
    data_type: DataType,
}

impl Tensor {
    // Constructors
    pub fn zeros(
        shape: &[usize],
        data_type: DataType,
    ) -> Self {
        Self {
            bytes: AlignedBytes::zeroed(size_for_shape(shape, data_type)),
            shape: shape.into(),
            data_type,
        }
    }

    pub fn from_bytes(
        shape: &[usize],
        data_type: DataType,
        bytes: &[u8],
    ) -> Result<Self, TensorError> {
        let expected_size = size_for_shape(shape, data_type);
        if expected_size != bytes.len() {
            return Err(TensorError::SizeMismatch {
                data_type,
                shape: shape.into(),
                expected_size,
                actual_size: bytes.len(),
            });
        }
        Ok(Self {
            bytes: AlignedBytes::copy_from(bytes),
            shape: shape.into(),
            data_type,
        })
    }

    pub fn from_slice<T: ArrayElement>(
        shape: &[usize],
        values: &[T],
    ) -> Result<Self, TensorError> {
        Self::from_bytes(shape, T::data_type(), bytemuck::cast_slice(values))
    }

    pub fn from_bools(
        shape: &[usize],
        values: &[bool],
    ) -> Result<Self, TensorError> {
        let bytes: Vec<u8> = values.iter().map(|&v| u8::from(v)).collect();
        Self::from_bytes(shape, DataType::Bool, &bytes)
    }

    pub fn scalar<T: ArrayElement>(value: T) -> Self {
        Self {
            bytes: AlignedBytes::copy_from(bytemuck::bytes_of(&value)),
            shape: Box::new([]),
            data_type: T::data_type(),
        }
    }

    // Getters
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn size(&self) -> usize {
        self.bytes.len
    }

    // Access
    fn validate_element_type<T: ArrayElement>(&self) {
        assert_eq!(
            T::data_type(),
            self.data_type,
            "Invalid data type, expected {:?}, actual {:?}",
            T::data_type(),
            self.data_type
        );
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes.as_bytes_mut()
    }

    pub fn as_slice<T: ArrayElement>(&self) -> &[T] {
        self.validate_element_type::<T>();
        bytemuck::cast_slice(self.as_bytes())
    }

    pub fn as_slice_mut<T: ArrayElement>(&mut self) -> &mut [T] {
        self.validate_element_type::<T>();
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }

    pub fn as_view<T: ArrayElement>(&self) -> ArrayView<'_, T, IxDyn> {
        ArrayView::from_shape(IxDyn(self.shape()), self.as_slice::<T>())
            .expect("Failed to create array view")
    }

    // Transformations
    pub fn reshape(
        self,
        shape: &[usize],
    ) -> Result<Self, TensorError> {
        if shape.iter().product::<usize>() != self.num_elements() {
            return Err(TensorError::ReshapeMismatch {
                from: self.shape,
                to: shape.into(),
            });
        }
        Ok(Self {
            shape: shape.into(),
            ..self
        })
    }

    /// Converts every element numerically into `target`. Floating point
    /// values are rounded to the nearest representable value; values that
    /// an integer type cannot hold (NaN, out of range) are an error.
    pub fn to_data_type(
        &self,
        target: DataType,
    ) -> Result<Tensor, TensorError> {
        if target == self.data_type {
            return Ok(self.clone());
        }
        let unrepresentable = || TensorError::UnrepresentableValue {
            from: self.data_type,
            to: target,
        };

        let bytes = with_element_type!(self.data_type, Source => {
            let source: &[Source] = bytemuck::cast_slice(self.as_bytes());
            if target == DataType::Bool {
                source
                    .iter()
                    .map(|value| value.to_f64().map(|v| u8::from(v != 0.0)))
                    .collect::<Option<Vec<u8>>>()
                    .map(AlignedBytes::from_vec)
            } else {
                with_element_type!(target, Target => {
                    cast_elements::<Source, Target>(source)
                        .map(AlignedBytes::from_vec)
                })
            }
        })
        .ok_or_else(unrepresentable)?;

        Ok(Tensor {
            bytes,
            shape: self.shape.clone(),
            data_type: target,
        })
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        Ok(self.to_data_type(DataType::F32)?.as_slice::<f32>().to_vec())
    }

    /// Element-wise `self + other`, accumulated in `f32` and returned in
    /// `self`'s data type.
    pub fn add_tensor(
        &self,
        other: &Tensor,
    ) -> Result<Tensor, TensorError> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        }
        let mut sum = self.to_data_type(DataType::F32)?;
        for (value, addend) in
            sum.as_slice_mut::<f32>().iter_mut().zip(other.to_f32_vec()?)
        {
            *value += addend;
        }
        sum.to_data_type(self.data_type)
    }
}

impl AlignedBytes {
    fn from_vec<T: ArrayElement>(values: Vec<T>) -> Self {
        Self::copy_from(bytemuck::cast_slice(&values))
    }
}

fn cast_elements<S: ArrayElement, D: ArrayElement>(
    source: &[S]
) -> Option<Vec<D>> {
    source.iter().map(|&value| D::from(value)).collect()
}
