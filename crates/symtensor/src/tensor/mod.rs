//! Core value abstractions shared by graphs, shared cells, and backends.
//!
//! The tensor module defines dtypes, runtime shapes, dense host values, and the static
//! [`TensorType`] every graph node carries. Conversion rules applied to call arguments live
//! next to the type so compile-time and call-time checks agree.

pub mod dtype;
mod host_tensor;
pub mod shape;
mod tensor_type;

pub use dtype::{DType, DTypeKind};
pub use host_tensor::{Tensor, TensorData};
pub use shape::Shape;
pub use tensor_type::TensorType;
