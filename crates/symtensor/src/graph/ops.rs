//! Graph-building operations with static type inference.
//!
//! Elementwise operations never fail at construction: dtypes promote and ranks take the
//! maximum, while shape compatibility is a runtime concern of the backend. Operations with
//! structural constraints (axes, dot ranks, dimshuffle patterns) return [`Result`].

use std::collections::HashSet;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::config::config;
use crate::error::{Error, Result};
use crate::tensor::{DType, Shape, Tensor, TensorType};

use super::{BinaryOp, CompareOp, DimEntry, Node, Op, ReduceOp, UnaryOp};

fn unary(op: UnaryOp, x: &Node) -> Node {
    let dtype = op.output_dtype(x.dtype(), config().float_dtype);
    Node::apply(
        Op::Unary(op),
        vec![x.clone()],
        TensorType::new(dtype, x.ndim()),
    )
}

fn binary(op: BinaryOp, lhs: &Node, rhs: &Node) -> Node {
    let dtype = op.output_dtype(lhs.dtype(), rhs.dtype());
    Node::apply(
        Op::Binary(op),
        vec![lhs.clone(), rhs.clone()],
        TensorType::new(dtype, lhs.ndim().max(rhs.ndim())),
    )
}

fn compare(op: CompareOp, lhs: &Node, rhs: &Node) -> Node {
    Node::apply(
        Op::Compare(op),
        vec![lhs.clone(), rhs.clone()],
        TensorType::new(DType::Bool, lhs.ndim().max(rhs.ndim())),
    )
}

/// Constant for a Rust float literal combined with `node`: keeps a float node's dtype.
fn float_literal(node: &Node, value: f64) -> Node {
    let dtype = if node.dtype().is_float() {
        node.dtype()
    } else {
        DType::F64
    };
    Node::constant(Tensor::full(dtype, Shape::scalar(), value))
}

/// Constant for a Rust integer literal combined with `node`: keeps the node's dtype when the
/// value is exactly representable in it, else promotes against `I64`.
fn int_literal(node: &Node, value: i64) -> Node {
    let dtype = if fits_losslessly(node.dtype(), value) {
        node.dtype()
    } else {
        DType::promote(node.dtype(), DType::I64)
    };
    Node::constant(Tensor::from(value).cast(dtype))
}

fn fits_losslessly(dtype: DType, value: i64) -> bool {
    match dtype {
        DType::Bool => false,
        DType::I8 => i8::try_from(value).is_ok(),
        DType::I16 => i16::try_from(value).is_ok(),
        DType::I32 => i32::try_from(value).is_ok(),
        DType::I64 => true,
        DType::F32 => (value as f32) as i128 == i128::from(value),
        DType::F64 => (value as f64) as i128 == i128::from(value),
    }
}

/// Elementwise select: `then` where `cond` is non-zero, `otherwise` elsewhere.
pub fn switch(cond: &Node, then: &Node, otherwise: &Node) -> Node {
    let dtype = BinaryOp::Maximum.output_dtype(then.dtype(), otherwise.dtype());
    let ndim = cond.ndim().max(then.ndim()).max(otherwise.ndim());
    Node::apply(
        Op::Switch,
        vec![cond.clone(), then.clone(), otherwise.clone()],
        TensorType::new(dtype, ndim),
    )
}

/// Sums any number of nodes left to right.
pub fn add_all(nodes: &[Node]) -> Result<Node> {
    fold_all(nodes, BinaryOp::Add, "add_all")
}

/// Multiplies any number of nodes left to right.
pub fn mul_all(nodes: &[Node]) -> Result<Node> {
    fold_all(nodes, BinaryOp::Mul, "mul_all")
}

fn fold_all(nodes: &[Node], op: BinaryOp, label: &str) -> Result<Node> {
    let (first, rest) = nodes
        .split_first()
        .ok_or_else(|| Error::InvalidGraph(format!("{label} requires at least one operand")))?;
    Ok(rest
        .iter()
        .fold(first.clone(), |acc, node| binary(op, &acc, node)))
}

fn normalize_axes(ndim: usize, axes: Option<&[usize]>, label: &str) -> Result<Option<Vec<usize>>> {
    let Some(axes) = axes else {
        return Ok(None);
    };
    let mut seen = HashSet::new();
    for &axis in axes {
        if axis >= ndim {
            return Err(Error::InvalidGraph(format!(
                "{label} axis {axis} out of range for rank {ndim}"
            )));
        }
        if !seen.insert(axis) {
            return Err(Error::InvalidGraph(format!(
                "{label} axis {axis} listed more than once"
            )));
        }
    }
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    Ok(Some(sorted))
}

impl Node {
    pub fn abs(&self) -> Node {
        unary(UnaryOp::Abs, self)
    }

    pub fn exp(&self) -> Node {
        unary(UnaryOp::Exp, self)
    }

    pub fn log(&self) -> Node {
        unary(UnaryOp::Log, self)
    }

    pub fn sqrt(&self) -> Node {
        unary(UnaryOp::Sqrt, self)
    }

    pub fn tanh(&self) -> Node {
        unary(UnaryOp::Tanh, self)
    }

    /// Logistic function `1 / (1 + exp(-x))`.
    pub fn sigmoid(&self) -> Node {
        unary(UnaryOp::Sigmoid, self)
    }

    pub fn erf(&self) -> Node {
        unary(UnaryOp::Erf, self)
    }

    pub fn sin(&self) -> Node {
        unary(UnaryOp::Sin, self)
    }

    pub fn cos(&self) -> Node {
        unary(UnaryOp::Cos, self)
    }

    pub fn isnan(&self) -> Node {
        unary(UnaryOp::IsNan, self)
    }

    pub fn isinf(&self) -> Node {
        unary(UnaryOp::IsInf, self)
    }

    pub fn logical_not(&self) -> Node {
        unary(UnaryOp::Not, self)
    }

    pub fn pow(&self, exponent: impl Into<Node>) -> Node {
        binary(BinaryOp::Pow, self, &exponent.into())
    }

    pub fn maximum(&self, other: impl Into<Node>) -> Node {
        binary(BinaryOp::Maximum, self, &other.into())
    }

    pub fn minimum(&self, other: impl Into<Node>) -> Node {
        binary(BinaryOp::Minimum, self, &other.into())
    }

    pub fn logical_and(&self, other: impl Into<Node>) -> Node {
        binary(BinaryOp::And, self, &other.into())
    }

    pub fn logical_or(&self, other: impl Into<Node>) -> Node {
        binary(BinaryOp::Or, self, &other.into())
    }

    pub fn lt(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Lt, self, &other.into())
    }

    pub fn le(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Le, self, &other.into())
    }

    pub fn gt(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Gt, self, &other.into())
    }

    pub fn ge(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Ge, self, &other.into())
    }

    pub fn equal(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Eq, self, &other.into())
    }

    pub fn not_equal(&self, other: impl Into<Node>) -> Node {
        compare(CompareOp::Ne, self, &other.into())
    }

    /// Generic reduction over `axes` (all axes when `None`).
    pub fn reduce(&self, op: ReduceOp, axes: Option<&[usize]>, keepdims: bool) -> Result<Node> {
        let label = format!("{op:?}").to_ascii_lowercase();
        let axes = normalize_axes(self.ndim(), axes, &label)?;
        let ndim = match (&axes, keepdims) {
            (_, true) => self.ndim(),
            (None, false) => 0,
            (Some(axes), false) => self.ndim() - axes.len(),
        };
        Ok(Node::apply(
            Op::Reduce { op, axes, keepdims },
            vec![self.clone()],
            TensorType::new(op.output_dtype(self.dtype()), ndim),
        ))
    }

    pub fn sum(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Sum, axes, false)
    }

    pub fn prod(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Prod, axes, false)
    }

    pub fn mean(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Mean, axes, false)
    }

    pub fn max(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Max, axes, false)
    }

    pub fn min(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Min, axes, false)
    }

    pub fn all(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::All, axes, false)
    }

    pub fn any(&self, axes: Option<&[usize]>) -> Result<Node> {
        self.reduce(ReduceOp::Any, axes, false)
    }

    /// Inner/matrix product for rank-1 and rank-2 operands.
    pub fn dot(&self, other: &Node) -> Result<Node> {
        let ndim = match (self.ndim(), other.ndim()) {
            (1, 1) => 0,
            (2, 1) | (1, 2) => 1,
            (2, 2) => 2,
            (lhs, rhs) => {
                return Err(Error::InvalidGraph(format!(
                    "dot expects rank-1 or rank-2 operands, got ranks {lhs} and {rhs}"
                )))
            }
        };
        let dtype = BinaryOp::Mul.output_dtype(self.dtype(), other.dtype());
        Ok(Node::apply(
            Op::Dot,
            vec![self.clone(), other.clone()],
            TensorType::new(dtype, ndim),
        ))
    }

    /// Reorders axes, inserts length-1 axes, and drops axes that are length 1 at runtime.
    pub fn dimshuffle(&self, pattern: &[DimEntry]) -> Result<Node> {
        let mut seen = HashSet::new();
        for entry in pattern {
            if let DimEntry::Axis(axis) = entry {
                if *axis >= self.ndim() {
                    return Err(Error::InvalidGraph(format!(
                        "dimshuffle axis {axis} out of range for rank {}",
                        self.ndim()
                    )));
                }
                if !seen.insert(*axis) {
                    return Err(Error::InvalidGraph(format!(
                        "dimshuffle axis {axis} listed more than once"
                    )));
                }
            }
        }
        Ok(Node::apply(
            Op::DimShuffle(pattern.to_vec()),
            vec![self.clone()],
            TensorType::new(self.dtype(), pattern.len()),
        ))
    }

    /// Reverses the axis order.
    pub fn transpose(&self) -> Node {
        let pattern: Vec<DimEntry> = (0..self.ndim()).rev().map(DimEntry::Axis).collect();
        Node::apply(
            Op::DimShuffle(pattern),
            vec![self.clone()],
            self.ty(),
        )
    }

    pub fn cast(&self, dtype: DType) -> Node {
        if dtype == self.dtype() {
            return self.clone();
        }
        Node::apply(
            Op::Cast(dtype),
            vec![self.clone()],
            self.ty().with_dtype(dtype),
        )
    }

    /// `log(sum(exp(x)))` over `axis` (all axes when `None`), stabilised by the running max.
    pub fn logsumexp(&self, axis: Option<usize>, keepdims: bool) -> Result<Node> {
        let axes = axis.map(|axis| [axis]);
        let axes = axes.as_ref().map(|a| a.as_slice());
        let max = self.reduce(ReduceOp::Max, axes, true)?;
        let max = switch(&max.isinf(), &float_literal(&max, 0.0), &max);
        let shifted = (self - &max).exp();
        let lse = shifted.reduce(ReduceOp::Sum, axes, true)?.log() + &max;
        if keepdims {
            return Ok(lse);
        }
        let dropped: HashSet<usize> = match axis {
            Some(axis) => [axis].into_iter().collect(),
            None => (0..self.ndim()).collect(),
        };
        let pattern: Vec<DimEntry> = (0..self.ndim())
            .filter(|axis| !dropped.contains(axis))
            .map(DimEntry::Axis)
            .collect();
        lse.dimshuffle(&pattern)
    }

    /// Normalised exponentials along `axis` (all axes when `None`).
    pub fn softmax(&self, axis: Option<usize>) -> Result<Node> {
        let axes = axis.map(|axis| [axis]);
        let axes = axes.as_ref().map(|a| a.as_slice());
        let max = self.reduce(ReduceOp::Max, axes, true)?;
        let exp = (self - &max).exp();
        let total = exp.reduce(ReduceOp::Sum, axes, true)?;
        Ok(exp / total)
    }

    /// `x - logsumexp(x)` along `axis` (all axes when `None`).
    pub fn log_softmax(&self, axis: Option<usize>) -> Result<Node> {
        Ok(self - &self.logsumexp(axis, true)?)
    }
}

macro_rules! node_binary_ops {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Node> for &Node {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                binary($op, self, rhs)
            }
        }

        impl $trait<Node> for &Node {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                binary($op, self, &rhs)
            }
        }

        impl $trait<&Node> for Node {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                binary($op, &self, rhs)
            }
        }

        impl $trait<Node> for Node {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                binary($op, &self, &rhs)
            }
        }

        impl $trait<f64> for &Node {
            type Output = Node;
            fn $method(self, rhs: f64) -> Node {
                binary($op, self, &float_literal(self, rhs))
            }
        }

        impl $trait<f64> for Node {
            type Output = Node;
            fn $method(self, rhs: f64) -> Node {
                binary($op, &self, &float_literal(&self, rhs))
            }
        }

        impl $trait<i64> for &Node {
            type Output = Node;
            fn $method(self, rhs: i64) -> Node {
                binary($op, self, &int_literal(self, rhs))
            }
        }

        impl $trait<i64> for Node {
            type Output = Node;
            fn $method(self, rhs: i64) -> Node {
                binary($op, &self, &int_literal(&self, rhs))
            }
        }

        impl $trait<&Node> for f64 {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                binary($op, &float_literal(rhs, self), rhs)
            }
        }

        impl $trait<Node> for f64 {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                binary($op, &float_literal(&rhs, self), &rhs)
            }
        }

        impl $trait<&Node> for i64 {
            type Output = Node;
            fn $method(self, rhs: &Node) -> Node {
                binary($op, &int_literal(rhs, self), rhs)
            }
        }

        impl $trait<Node> for i64 {
            type Output = Node;
            fn $method(self, rhs: Node) -> Node {
                binary($op, &int_literal(&rhs, self), &rhs)
            }
        }
    };
}

node_binary_ops!(Add, add, BinaryOp::Add);
node_binary_ops!(Sub, sub, BinaryOp::Sub);
node_binary_ops!(Mul, mul, BinaryOp::Mul);
node_binary_ops!(Div, div, BinaryOp::TrueDiv);

impl Neg for &Node {
    type Output = Node;
    fn neg(self) -> Node {
        unary(UnaryOp::Neg, self)
    }
}

impl Neg for Node {
    type Output = Node;
    fn neg(self) -> Node {
        unary(UnaryOp::Neg, &self)
    }
}
