//! Kernel execution contract between compiled functions and concrete backends.
//!
//! A compiled function walks its schedule node by node and hands each operation, together with
//! already-computed operand values, to a [`Backend`]. Random draws go through
//! [`Backend::sample`], which also reports the generator state that follows the draw so the
//! function can commit it as an update.

use thiserror::Error;

use crate::graph::{Op, RandomSpec};
use crate::tensor::{Tensor, TensorType};

/// Errors produced while executing a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: &'static str, reason: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Result of one random draw: the sampled value and the generator state after it.
#[derive(Debug, Clone)]
pub struct Sample {
    pub value: Tensor,
    pub next_state: Tensor,
}

/// Executes graph operations on host values.
pub trait Backend: Send + Sync {
    /// Returns a human-readable backend identifier (e.g., `"cpu"`).
    fn backend_name(&self) -> &str;

    /// Computes one deterministic operation. `output` is the statically inferred result type;
    /// the returned tensor must carry exactly that dtype and rank.
    fn execute(&self, op: &Op, inputs: &[Tensor], output: &TensorType) -> BackendResult<Tensor>;

    /// Draws from `spec.distribution` using the generator `state` and distribution `params`.
    fn sample(
        &self,
        spec: &RandomSpec,
        state: &Tensor,
        params: &[Tensor],
        output: &TensorType,
    ) -> BackendResult<Sample>;
}
