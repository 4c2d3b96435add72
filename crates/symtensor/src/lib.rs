pub mod backend;
pub mod config;
mod error;
pub mod function;
pub mod graph;
pub mod random;
pub mod shared;
pub mod tensor;

pub use backend::{Backend, BackendError, BackendResult, Sample};
pub use error::{Error, Result};
pub use function::{
    function, Args, CopyOptions, Function, FunctionBuilder, FunctionOutput, In, Outputs,
};
pub use graph::{Node, NodeId};
pub use random::RandomStream;
pub use shared::{CellId, SharedCell};
pub use tensor::{DType, Shape, Tensor, TensorType};
