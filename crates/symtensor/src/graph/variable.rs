//! Constructors for symbolic variables.
//!
//! The unprefixed constructors use the configured float dtype; the prefixed shorthands fix the
//! dtype (`d` = float64, `f` = float32, `i` = int32, `l` = int64).

use crate::config::config;
use crate::tensor::{DType, TensorType};

use super::Node;

/// Creates a named variable of arbitrary dtype and rank.
pub fn tensor(name: &str, dtype: DType, ndim: usize) -> Node {
    Node::variable(TensorType::new(dtype, ndim), Some(name))
}

/// Creates an unnamed variable; it can only be bound positionally.
pub fn anonymous(dtype: DType, ndim: usize) -> Node {
    Node::variable(TensorType::new(dtype, ndim), None)
}

pub fn scalar(name: &str) -> Node {
    tensor(name, config().float_dtype, 0)
}

pub fn vector(name: &str) -> Node {
    tensor(name, config().float_dtype, 1)
}

pub fn matrix(name: &str) -> Node {
    tensor(name, config().float_dtype, 2)
}

pub fn dscalar(name: &str) -> Node {
    tensor(name, DType::F64, 0)
}

pub fn dvector(name: &str) -> Node {
    tensor(name, DType::F64, 1)
}

pub fn dmatrix(name: &str) -> Node {
    tensor(name, DType::F64, 2)
}

pub fn fscalar(name: &str) -> Node {
    tensor(name, DType::F32, 0)
}

pub fn fvector(name: &str) -> Node {
    tensor(name, DType::F32, 1)
}

pub fn fmatrix(name: &str) -> Node {
    tensor(name, DType::F32, 2)
}

pub fn iscalar(name: &str) -> Node {
    tensor(name, DType::I32, 0)
}

pub fn ivector(name: &str) -> Node {
    tensor(name, DType::I32, 1)
}

pub fn lscalar(name: &str) -> Node {
    tensor(name, DType::I64, 0)
}

pub fn lvector(name: &str) -> Node {
    tensor(name, DType::I64, 1)
}

/// Creates one float64 scalar per name, in order.
pub fn dscalars<const N: usize>(names: [&str; N]) -> [Node; N] {
    names.map(dscalar)
}
