//! Enumerates the scalar element types a symbolic tensor can carry.

use std::fmt;
use std::str::FromStr;

/// Logical dtype identifier shared between symbolic types and host values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    /// Boolean mask values, produced by comparisons and predicates.
    Bool,
    I8,
    I16,
    I32,
    /// 64-bit signed integer, also used for generator state.
    I64,
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 64-bit floating point following IEEE-754 semantics.
    F64,
}

/// Coarse element kind used for promotion and conversion decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Bool,
    Int,
    Float,
}

impl DType {
    /// Returns the element kind of the dtype.
    pub fn kind(self) -> DTypeKind {
        match self {
            DType::Bool => DTypeKind::Bool,
            DType::I8 | DType::I16 | DType::I32 | DType::I64 => DTypeKind::Int,
            DType::F32 | DType::F64 => DTypeKind::Float,
        }
    }

    pub fn is_float(self) -> bool {
        self.kind() == DTypeKind::Float
    }

    pub fn is_integer(self) -> bool {
        self.kind() == DTypeKind::Int
    }

    pub fn is_bool(self) -> bool {
        self == DType::Bool
    }

    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    /// Produces the conventional array-library name (`"float64"`, `"int32"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Smallest dtype able to represent every value of both operands.
    ///
    /// Integers up to 16 bits fit in `F32`; wider integers require `F64`.
    pub fn promote(a: DType, b: DType) -> DType {
        use DTypeKind::*;
        match (a.kind(), b.kind()) {
            (Bool, _) => b,
            (_, Bool) => a,
            (Int, Int) | (Float, Float) => a.max(b),
            (Int, Float) => promote_int_float(a, b),
            (Float, Int) => promote_int_float(b, a),
        }
    }

    /// Folds [`DType::promote`] over a sequence, returning `None` when empty.
    pub fn promote_all<I: IntoIterator<Item = DType>>(dtypes: I) -> Option<DType> {
        dtypes.into_iter().reduce(DType::promote)
    }

    /// Returns `true` when every value of `from` is representable in `to` without loss.
    pub fn can_cast_safely(from: DType, to: DType) -> bool {
        from == to || DType::promote(from, to) == to
    }
}

fn promote_int_float(int: DType, float: DType) -> DType {
    match (int, float) {
        (DType::I8 | DType::I16, DType::F32) => DType::F32,
        _ => DType::F64,
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a dtype name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dtype name '{0}'")]
pub struct ParseDTypeError(pub String);

impl FromStr for DType {
    type Err = ParseDTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(DType::Bool),
            "int8" | "i8" => Ok(DType::I8),
            "int16" | "i16" => Ok(DType::I16),
            "int32" | "i32" => Ok(DType::I32),
            "int64" | "i64" => Ok(DType::I64),
            "float32" | "f32" => Ok(DType::F32),
            "float64" | "f64" => Ok(DType::F64),
            other => Err(ParseDTypeError(other.to_string())),
        }
    }
}
