//! Lightweight wrapper for tensor shapes and dimension bookkeeping.

use std::fmt;

use smallvec::SmallVec;

/// Inline storage for dimensions; most tensors have rank four or less.
pub type Dims = SmallVec<[usize; 4]>;

/// Stores the logical dimensions of a runtime value. An empty shape is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Shape {
            dims: Dims::from_vec(dims.into()),
        }
    }

    /// Shape of a rank-0 value.
    pub fn scalar() -> Self {
        Shape::default()
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Dims {
        let mut strides: Dims = SmallVec::from_elem(1, self.dims.len());
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }

    /// Broadcasts two shapes following numpy rules, returning `None` when incompatible.
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims: Dims = SmallVec::with_capacity(rank);
        for axis in 0..rank {
            let lhs = dim_from_right(&self.dims, rank, axis);
            let rhs = dim_from_right(&other.dims, rank, axis);
            let dim = match (lhs, rhs) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
            dims.push(dim);
        }
        Some(Shape { dims })
    }
}

fn dim_from_right(dims: &[usize], rank: usize, axis: usize) -> usize {
    let offset = rank - dims.len();
    if axis < offset {
        1
    } else {
        dims[axis - offset]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}
