//! Operation vocabulary recorded in expression graphs.

use std::fmt;

use crate::tensor::{DType, Shape};

/// Elementwise single-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Sigmoid,
    Erf,
    Sin,
    Cos,
    IsNan,
    IsInf,
    Not,
}

impl UnaryOp {
    /// Result dtype for an operand of `input` dtype.
    pub fn output_dtype(self, input: DType, float_dtype: DType) -> DType {
        match self {
            UnaryOp::Neg | UnaryOp::Abs => match input {
                DType::Bool => DType::I8,
                other => other,
            },
            UnaryOp::IsNan | UnaryOp::IsInf | UnaryOp::Not => DType::Bool,
            _ if input.is_float() => input,
            _ => DType::promote(input, float_dtype),
        }
    }
}

/// Elementwise two-operand operations with broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    Pow,
    Maximum,
    Minimum,
    And,
    Or,
}

impl BinaryOp {
    pub fn output_dtype(self, lhs: DType, rhs: DType) -> DType {
        let promoted = DType::promote(lhs, rhs);
        match self {
            BinaryOp::And | BinaryOp::Or => DType::Bool,
            BinaryOp::TrueDiv if !promoted.is_float() => DType::F64,
            BinaryOp::Maximum | BinaryOp::Minimum => promoted,
            _ if promoted == DType::Bool => DType::I8,
            _ => promoted,
        }
    }
}

/// Elementwise comparisons producing boolean masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Reductions over a set of axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Prod,
    Mean,
    Max,
    Min,
    All,
    Any,
}

impl ReduceOp {
    pub fn output_dtype(self, input: DType) -> DType {
        match self {
            ReduceOp::Sum | ReduceOp::Prod if !input.is_float() => DType::I64,
            ReduceOp::Mean if !input.is_float() => DType::F64,
            ReduceOp::All | ReduceOp::Any => DType::Bool,
            _ => input,
        }
    }
}

/// One entry of a dimshuffle pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimEntry {
    /// Takes the given input axis.
    Axis(usize),
    /// Inserts a new length-1 axis.
    Broadcast,
}

/// Supported sampling distributions. Each takes two parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distribution {
    /// `low`, `high`: uniform on `[low, high)`.
    Uniform,
    /// `loc`, `scale`: Gaussian.
    Normal,
    /// `low`, `high`: integers on `[low, high)`.
    Integers,
}

impl Distribution {
    pub fn num_params(self) -> usize {
        2
    }

    pub fn name(self) -> &'static str {
        match self {
            Distribution::Uniform => "uniform",
            Distribution::Normal => "normal",
            Distribution::Integers => "integers",
        }
    }
}

/// Attributes of a random draw: which distribution and an optional fixed output size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomSpec {
    pub distribution: Distribution,
    pub size: Option<Shape>,
}

/// Operation applied by an `Apply` node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare(CompareOp),
    /// `switch(cond, then, else)`.
    Switch,
    Reduce {
        op: ReduceOp,
        axes: Option<Vec<usize>>,
        keepdims: bool,
    },
    Dot,
    DimShuffle(Vec<DimEntry>),
    Cast(DType),
    /// Inputs are `[state, params...]`; the node evaluates to the sample.
    Random(RandomSpec),
    /// Input is a random node; evaluates to the generator state after that draw.
    RngNextState,
}

impl Op {
    /// Short label used in debug output and error messages.
    pub fn label(&self) -> String {
        match self {
            Op::Unary(op) => format!("{op:?}").to_ascii_lowercase(),
            Op::Binary(op) => format!("{op:?}").to_ascii_lowercase(),
            Op::Compare(op) => format!("{op:?}").to_ascii_lowercase(),
            Op::Switch => "switch".to_string(),
            Op::Reduce { op, .. } => format!("{op:?}").to_ascii_lowercase(),
            Op::Dot => "dot".to_string(),
            Op::DimShuffle(_) => "dimshuffle".to_string(),
            Op::Cast(dtype) => format!("cast<{dtype}>"),
            Op::Random(spec) => format!("random_{}", spec.distribution.name()),
            Op::RngNextState => "rng_next_state".to_string(),
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, Op::Random(_))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
