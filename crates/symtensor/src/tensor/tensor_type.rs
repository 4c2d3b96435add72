//! Static tensor types: element kind plus rank, checked at compile and call time.

use std::fmt;

use super::{DType, DTypeKind, Tensor};
use crate::error::{Error, Result};

/// Static type of a graph node. Shapes are only known at runtime; ranks are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub ndim: usize,
}

impl TensorType {
    pub fn new(dtype: DType, ndim: usize) -> Self {
        TensorType { dtype, ndim }
    }

    pub fn scalar(dtype: DType) -> Self {
        TensorType::new(dtype, 0)
    }

    /// Type describing an existing value.
    pub fn of(value: &Tensor) -> Self {
        TensorType::new(value.dtype(), value.ndim())
    }

    pub fn with_dtype(self, dtype: DType) -> Self {
        TensorType { dtype, ..self }
    }

    /// Returns `true` when `value` already has exactly this type.
    pub fn matches(&self, value: &Tensor) -> bool {
        value.dtype() == self.dtype && value.ndim() == self.ndim
    }

    /// Converts `value` to this type.
    ///
    /// Ranks must always agree. In strict mode the dtype must match exactly; otherwise safe
    /// casts, integer-to-float conversion and float narrowing are applied, while float or
    /// integer values are never silently turned into integers or booleans.
    pub fn filter(&self, value: Tensor, strict: bool, context: &str) -> Result<Tensor> {
        if value.ndim() != self.ndim {
            return Err(Error::type_mismatch(context, self, TensorType::of(&value)));
        }
        if value.dtype() == self.dtype {
            return Ok(value);
        }
        if strict || !self.accepts_dtype(value.dtype()) {
            return Err(Error::type_mismatch(context, self, TensorType::of(&value)));
        }
        Ok(value.cast(self.dtype))
    }

    fn accepts_dtype(&self, from: DType) -> bool {
        DType::can_cast_safely(from, self.dtype) || self.dtype.kind() == DTypeKind::Float
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.ndim {
            0 => "scalar".to_string(),
            1 => "vector".to_string(),
            2 => "matrix".to_string(),
            n => format!("{n}d tensor"),
        };
        write!(f, "{} {}", self.dtype, rank)
    }
}
