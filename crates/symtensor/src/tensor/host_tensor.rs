//! Host-backed tensor values: call arguments, shared-cell contents, constants, and results.

use std::fmt;
use std::sync::Arc;

use super::{dtype::DType, dtype::DTypeKind, shape::Shape};
use crate::error::{Error, Result};

/// Element storage grouped by dtype kind. Narrow dtypes are stored widened and normalised.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Arc<[bool]>),
    Int(Arc<[i64]>),
    Float(Arc<[f64]>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::Bool(values) => values.len(),
            TensorData::Int(values) => values.len(),
            TensorData::Float(values) => values.len(),
        }
    }
}

/// Dense host value with a dtype and a runtime shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Builds a tensor of `dtype` from floating-point values, converting each element.
    pub fn from_f64s(dtype: DType, shape: Shape, values: Vec<f64>) -> Result<Self> {
        check_len(&shape, values.len())?;
        let data = match dtype.kind() {
            DTypeKind::Float => {
                TensorData::Float(values.into_iter().map(|v| round_float(dtype, v)).collect())
            }
            DTypeKind::Int => TensorData::Int(
                values
                    .into_iter()
                    .map(|v| wrap_int(dtype, v as i64))
                    .collect(),
            ),
            DTypeKind::Bool => TensorData::Bool(values.into_iter().map(|v| v != 0.0).collect()),
        };
        Ok(Tensor { dtype, shape, data })
    }

    /// Builds a tensor of `dtype` from integer values, converting each element.
    pub fn from_i64s(dtype: DType, shape: Shape, values: Vec<i64>) -> Result<Self> {
        check_len(&shape, values.len())?;
        let data = match dtype.kind() {
            DTypeKind::Float => TensorData::Float(
                values
                    .into_iter()
                    .map(|v| round_float(dtype, v as f64))
                    .collect(),
            ),
            DTypeKind::Int => {
                TensorData::Int(values.into_iter().map(|v| wrap_int(dtype, v)).collect())
            }
            DTypeKind::Bool => TensorData::Bool(values.into_iter().map(|v| v != 0).collect()),
        };
        Ok(Tensor { dtype, shape, data })
    }

    /// Builds a boolean tensor.
    pub fn from_bools(shape: Shape, values: Vec<bool>) -> Result<Self> {
        check_len(&shape, values.len())?;
        Ok(Tensor {
            dtype: DType::Bool,
            shape,
            data: TensorData::Bool(Arc::from(values)),
        })
    }

    /// Constructs an `F64` tensor from raw values, validating the length against the shape.
    pub fn from_vec(shape: impl Into<Shape>, values: Vec<f64>) -> Result<Self> {
        Tensor::from_f64s(DType::F64, shape.into(), values)
    }

    /// Constructs an `I64` tensor from raw values, validating the length against the shape.
    pub fn from_vec_i64(shape: impl Into<Shape>, values: Vec<i64>) -> Result<Self> {
        Tensor::from_i64s(DType::I64, shape.into(), values)
    }

    /// Returns a zero-initialised tensor of the requested dtype and shape.
    pub fn zeros(dtype: DType, shape: impl Into<Shape>) -> Self {
        Tensor::full(dtype, shape, 0.0)
    }

    /// Returns a tensor with every element set to `value`, converted to `dtype`.
    pub fn full(dtype: DType, shape: impl Into<Shape>, value: f64) -> Self {
        let shape = shape.into();
        let len = shape.num_elements();
        let data = match dtype.kind() {
            DTypeKind::Float => TensorData::Float(vec![round_float(dtype, value); len].into()),
            DTypeKind::Int => TensorData::Int(vec![wrap_int(dtype, value as i64); len].into()),
            DTypeKind::Bool => TensorData::Bool(vec![value != 0.0; len].into()),
        };
        Tensor { dtype, shape, data }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.rank()
    }

    /// Returns the total number of elements stored in the tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Copies every element out as `f64` (booleans become `0.0`/`1.0`).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::Bool(values) => values.iter().map(|&v| f64::from(u8::from(v))).collect(),
            TensorData::Int(values) => values.iter().map(|&v| v as f64).collect(),
            TensorData::Float(values) => values.to_vec(),
        }
    }

    /// Copies every element out as `i64`, truncating floats toward zero.
    pub fn to_i64_vec(&self) -> Vec<i64> {
        match &self.data {
            TensorData::Bool(values) => values.iter().map(|&v| i64::from(v)).collect(),
            TensorData::Int(values) => values.to_vec(),
            TensorData::Float(values) => values.iter().map(|&v| v as i64).collect(),
        }
    }

    /// Copies every element out as a truth value (non-zero is `true`).
    pub fn to_bool_vec(&self) -> Vec<bool> {
        match &self.data {
            TensorData::Bool(values) => values.to_vec(),
            TensorData::Int(values) => values.iter().map(|&v| v != 0).collect(),
            TensorData::Float(values) => values.iter().map(|&v| v != 0.0).collect(),
        }
    }

    /// Returns the single element as `f64`, or `None` when the tensor holds more than one.
    pub fn item_f64(&self) -> Option<f64> {
        (self.len() == 1).then(|| self.to_f64_vec()[0])
    }

    /// Returns the single element as `i64`, or `None` when the tensor holds more than one.
    pub fn item_i64(&self) -> Option<i64> {
        (self.len() == 1).then(|| self.to_i64_vec()[0])
    }

    /// Converts the tensor contents into another dtype, keeping the shape.
    pub fn cast(&self, dtype: DType) -> Tensor {
        if dtype == self.dtype {
            return self.clone();
        }
        let shape = self.shape.clone();
        let converted = match &self.data {
            TensorData::Float(values) => Tensor::from_f64s(dtype, shape, values.to_vec()),
            TensorData::Int(values) => Tensor::from_i64s(dtype, shape, values.to_vec()),
            TensorData::Bool(values) => Tensor::from_i64s(
                dtype,
                shape,
                values.iter().map(|&v| i64::from(v)).collect(),
            ),
        };
        converted.unwrap_or_else(|_| unreachable!("cast preserves element count"))
    }

    /// Reinterprets the elements under a new shape with the same element count.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor> {
        let shape = shape.into();
        check_len(&shape, self.len())?;
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            data: self.data.clone(),
        })
    }

    /// Elementwise closeness check with relative and absolute tolerances, NaNs compare equal.
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        if self.shape != other.shape {
            return false;
        }
        self.to_f64_vec()
            .iter()
            .zip(other.to_f64_vec().iter())
            .all(|(&a, &b)| {
                (a.is_nan() && b.is_nan()) || a == b || (a - b).abs() <= atol + rtol * b.abs()
            })
    }
}

fn check_len(shape: &Shape, len: usize) -> Result<()> {
    if shape.num_elements() != len {
        return Err(Error::InvalidValue(format!(
            "tensor data length ({len}) does not match shape {shape}"
        )));
    }
    Ok(())
}

fn round_float(dtype: DType, value: f64) -> f64 {
    match dtype {
        DType::F32 => f64::from(value as f32),
        _ => value,
    }
}

fn wrap_int(dtype: DType, value: i64) -> i64 {
    match dtype {
        DType::I8 => i64::from(value as i8),
        DType::I16 => i64::from(value as i16),
        DType::I32 => i64::from(value as i32),
        _ => value,
    }
}

macro_rules! scalar_from {
    ($ty:ty, $dtype:expr, $variant:ident, $conv:expr) => {
        impl From<$ty> for Tensor {
            fn from(value: $ty) -> Self {
                Tensor {
                    dtype: $dtype,
                    shape: Shape::scalar(),
                    data: TensorData::$variant(Arc::from([$conv(value)])),
                }
            }
        }
    };
}

scalar_from!(f64, DType::F64, Float, |v: f64| v);
scalar_from!(f32, DType::F32, Float, f64::from);
scalar_from!(i64, DType::I64, Int, |v: i64| v);
scalar_from!(i32, DType::I32, Int, i64::from);
scalar_from!(bool, DType::Bool, Bool, |v: bool| v);

impl From<Vec<f64>> for Tensor {
    fn from(values: Vec<f64>) -> Self {
        let shape = Shape::new([values.len()]);
        Tensor {
            dtype: DType::F64,
            shape,
            data: TensorData::Float(Arc::from(values)),
        }
    }
}

impl From<Vec<i64>> for Tensor {
    fn from(values: Vec<i64>) -> Self {
        let shape = Shape::new([values.len()]);
        Tensor {
            dtype: DType::I64,
            shape,
            data: TensorData::Int(Arc::from(values)),
        }
    }
}

impl From<&Tensor> for Tensor {
    fn from(value: &Tensor) -> Self {
        value.clone()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor<{}{}>[", self.dtype, self.shape)?;
        let preview = 8;
        let values = self.to_f64_vec();
        for (idx, value) in values.iter().take(preview).enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            match self.dtype.kind() {
                DTypeKind::Float => write!(f, "{value}")?,
                DTypeKind::Int => write!(f, "{}", *value as i64)?,
                DTypeKind::Bool => write!(f, "{}", *value != 0.0)?,
            }
        }
        if values.len() > preview {
            write!(f, ", ...")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_dtypes_normalise_on_construction() {
        let t = Tensor::from_i64s(DType::I8, Shape::new([2]), vec![127, 128]).unwrap();
        assert_eq!(t.to_i64_vec(), vec![127, -128]);

        let f = Tensor::from_f64s(DType::F32, Shape::scalar(), vec![0.1]).unwrap();
        assert_eq!(f.item_f64(), Some(f64::from(0.1f32)));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = Tensor::from_vec([2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn cast_converts_between_kinds() {
        let t = Tensor::from_vec([3], vec![1.7, -2.2, 0.0]).unwrap();
        assert_eq!(t.cast(DType::I32).to_i64_vec(), vec![1, -2, 0]);
        assert_eq!(t.cast(DType::Bool).to_bool_vec(), vec![true, true, false]);
        assert_eq!(Tensor::from(true).cast(DType::F64).item_f64(), Some(1.0));
    }

    #[test]
    fn scalars_convert_with_their_natural_dtype() {
        assert_eq!(Tensor::from(3i32).dtype(), DType::I32);
        assert_eq!(Tensor::from(3i64).dtype(), DType::I64);
        assert_eq!(Tensor::from(3.0f32).dtype(), DType::F32);
        assert_eq!(Tensor::from(3.0).ndim(), 0);
        assert_eq!(Tensor::from(vec![1.0, 2.0]).shape().dims(), &[2]);
    }
}
