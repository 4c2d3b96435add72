//! Expression graphs: typed, immutable DAGs of variables, constants, shared-cell reads, and
//! operations.
//!
//! Nodes are built through [`variable`] constructors, [`Node::constant`], shared-cell
//! expressions, and the operations in `ops`. Nothing is evaluated until a graph is compiled
//! into a [`Function`](crate::function::Function).

mod node;
mod op;
mod ops;
mod rewrite;
mod topology;
pub mod variable;

pub use node::{Node, NodeId, NodeKind};
pub use op::{BinaryOp, CompareOp, DimEntry, Distribution, Op, RandomSpec, ReduceOp, UnaryOp};
pub use ops::{add_all, mul_all, switch};
pub use rewrite::clone_replace;
pub use topology::{ancestors, shared_cells, toposort, variables};
pub use variable::{
    anonymous, dmatrix, dscalar, dscalars, dvector, fmatrix, fscalar, fvector, iscalar, ivector,
    lscalar, lvector, matrix, scalar, tensor, vector,
};
