use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use symtensor::backend::{Backend, BackendError, BackendResult, Sample};
use symtensor::graph::{
    BinaryOp, CompareOp, DimEntry, Distribution, Op, RandomSpec, ReduceOp, UnaryOp,
};
use symtensor::tensor::{DType, DTypeKind, Shape, Tensor, TensorData, TensorType};

/// Hook consulted before the built-in kernels; returning `Some` short-circuits them.
pub trait CpuKernelInterceptor: Send + Sync {
    fn try_execute(
        &self,
        op: &Op,
        inputs: &[Tensor],
        output: &TensorType,
    ) -> Option<BackendResult<Tensor>>;
}

#[derive(Default)]
pub struct NoopInterceptor;

impl CpuKernelInterceptor for NoopInterceptor {
    fn try_execute(
        &self,
        _op: &Op,
        _inputs: &[Tensor],
        _output: &TensorType,
    ) -> Option<BackendResult<Tensor>> {
        None
    }
}

#[derive(Clone)]
pub struct GenericCpuBackend<I: CpuKernelInterceptor> {
    interceptor: Arc<I>,
}

impl<I: CpuKernelInterceptor> GenericCpuBackend<I> {
    pub fn with_interceptor(interceptor: I) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
        }
    }

    pub fn with_arc(interceptor: Arc<I>) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &I {
        self.interceptor.as_ref()
    }
}

impl GenericCpuBackend<NoopInterceptor> {
    pub fn new() -> Self {
        Self::with_interceptor(NoopInterceptor)
    }
}

impl Default for GenericCpuBackend<NoopInterceptor> {
    fn default() -> Self {
        Self::new()
    }
}

pub type CpuBackend = GenericCpuBackend<NoopInterceptor>;

impl<I: CpuKernelInterceptor> Backend for GenericCpuBackend<I> {
    fn backend_name(&self) -> &str {
        "cpu"
    }

    fn execute(&self, op: &Op, inputs: &[Tensor], output: &TensorType) -> BackendResult<Tensor> {
        if let Some(result) = self.interceptor.try_execute(op, inputs, output) {
            return result;
        }
        execute_operation(op, inputs, output)
    }

    fn sample(
        &self,
        spec: &RandomSpec,
        state: &Tensor,
        params: &[Tensor],
        output: &TensorType,
    ) -> BackendResult<Sample> {
        op_sample(spec, state, params, output)
    }
}

fn execute_operation(op: &Op, inputs: &[Tensor], output: &TensorType) -> BackendResult<Tensor> {
    match op {
        Op::Unary(op) => op_unary(expect_arity(inputs, 1, "unary")?, *op, output),
        Op::Binary(op) => op_binary(expect_arity(inputs, 2, "binary")?, *op, output),
        Op::Compare(op) => op_compare(expect_arity(inputs, 2, "compare")?, *op, output),
        Op::Switch => op_switch(expect_arity(inputs, 3, "switch")?, output),
        Op::Reduce { op, axes, keepdims } => op_reduce(
            expect_arity(inputs, 1, "reduce")?,
            *op,
            axes.as_deref(),
            *keepdims,
            output,
        ),
        Op::Dot => op_dot(expect_arity(inputs, 2, "dot")?, output),
        Op::DimShuffle(pattern) => {
            op_dimshuffle(expect_arity(inputs, 1, "dimshuffle")?, pattern, output)
        }
        Op::Cast(dtype) => Ok(expect_arity(inputs, 1, "cast")?[0].cast(*dtype)),
        Op::Random(_) => Err(BackendError::unimplemented(
            "random",
            "random draws go through Backend::sample",
        )),
        Op::RngNextState => Err(BackendError::unimplemented(
            "rng_next_state",
            "generator states are produced by Backend::sample",
        )),
    }
}

/// Element buffers in the widened representation used by the kernels.
enum Values {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

fn finish(output: &TensorType, shape: Shape, values: Values) -> BackendResult<Tensor> {
    if shape.rank() != output.ndim {
        return Err(BackendError::execution(format!(
            "kernel produced rank {} for a {} result",
            shape.rank(),
            output
        )));
    }
    let result = match values {
        Values::Float(values) => Tensor::from_f64s(output.dtype, shape, values),
        Values::Int(values) => Tensor::from_i64s(output.dtype, shape, values),
        Values::Bool(values) if output.dtype == DType::Bool => Tensor::from_bools(shape, values),
        Values::Bool(values) => Tensor::from_i64s(
            output.dtype,
            shape,
            values.into_iter().map(i64::from).collect(),
        ),
    };
    result.map_err(|err| BackendError::execution(err.to_string()))
}

fn values_of(tensor: &Tensor, kind: DTypeKind) -> Values {
    match kind {
        DTypeKind::Bool => Values::Bool(tensor.to_bool_vec()),
        DTypeKind::Int => Values::Int(tensor.to_i64_vec()),
        DTypeKind::Float => Values::Float(tensor.to_f64_vec()),
    }
}

fn gather<T: Copy>(values: &[T], index: &[usize]) -> Vec<T> {
    index.iter().map(|&i| values[i]).collect()
}

fn gather_values(tensor: &Tensor, index: &[usize]) -> Values {
    match tensor.data() {
        TensorData::Bool(values) => Values::Bool(gather(values, index)),
        TensorData::Int(values) => Values::Int(gather(values, index)),
        TensorData::Float(values) => Values::Float(gather(values, index)),
    }
}

/// Broadcasts `shapes` together and returns, per operand, the source index of every output
/// element.
fn broadcast_plan(shapes: &[&Shape]) -> BackendResult<(Shape, Vec<Vec<usize>>)> {
    let mut out = Shape::scalar();
    for shape in shapes {
        out = out.broadcast(shape).ok_or_else(|| {
            BackendError::execution(format!(
                "shapes {} cannot be broadcast together",
                shapes
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
    }
    let maps = shapes.iter().map(|shape| broadcast_index(shape, &out)).collect();
    Ok((out, maps))
}

fn broadcast_index(shape: &Shape, out: &Shape) -> Vec<usize> {
    let out_dims = out.dims();
    let offset = out_dims.len() - shape.rank();
    let strides = shape.strides();
    let mut effective = vec![0usize; out_dims.len()];
    for (axis, (&dim, &stride)) in shape.dims().iter().zip(strides.iter()).enumerate() {
        if dim != 1 {
            effective[axis + offset] = stride;
        }
    }
    MultiIndex::new(out_dims)
        .map(|coords| coords.iter().zip(&effective).map(|(c, s)| c * s).sum::<usize>())
        .collect()
}

fn op_unary(inputs: &[Tensor], op: UnaryOp, output: &TensorType) -> BackendResult<Tensor> {
    let input = &inputs[0];
    let values = match (op, output.dtype.kind()) {
        (UnaryOp::Not, _) => Values::Bool(input.to_bool_vec().into_iter().map(|v| !v).collect()),
        (UnaryOp::IsNan, _) => {
            Values::Bool(input.to_f64_vec().into_iter().map(f64::is_nan).collect())
        }
        (UnaryOp::IsInf, _) => {
            Values::Bool(input.to_f64_vec().into_iter().map(f64::is_infinite).collect())
        }
        (UnaryOp::Neg, DTypeKind::Int) => Values::Int(
            input
                .to_i64_vec()
                .into_iter()
                .map(i64::wrapping_neg)
                .collect(),
        ),
        (UnaryOp::Abs, DTypeKind::Int) => Values::Int(
            input
                .to_i64_vec()
                .into_iter()
                .map(i64::wrapping_abs)
                .collect(),
        ),
        (op, _) => Values::Float(
            input
                .to_f64_vec()
                .into_iter()
                .map(|x| float_unary(op, x))
                .collect(),
        ),
    };
    finish(output, input.shape().clone(), values)
}

fn float_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Abs => x.abs(),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Tanh => x.tanh(),
        UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        UnaryOp::Erf => libm::erf(x),
        UnaryOp::Sin => x.sin(),
        UnaryOp::Cos => x.cos(),
        UnaryOp::IsNan => f64::from(u8::from(x.is_nan())),
        UnaryOp::IsInf => f64::from(u8::from(x.is_infinite())),
        UnaryOp::Not => f64::from(u8::from(x == 0.0)),
    }
}

fn op_binary(inputs: &[Tensor], op: BinaryOp, output: &TensorType) -> BackendResult<Tensor> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    let (shape, maps) = broadcast_plan(&[lhs.shape(), rhs.shape()])?;
    let pairs = maps[0].iter().zip(&maps[1]);
    let values = match output.dtype.kind() {
        DTypeKind::Float => {
            let (a, b) = (lhs.to_f64_vec(), rhs.to_f64_vec());
            Values::Float(pairs.map(|(&i, &j)| float_binary(op, a[i], b[j])).collect())
        }
        DTypeKind::Int => {
            let (a, b) = (lhs.to_i64_vec(), rhs.to_i64_vec());
            Values::Int(
                pairs
                    .map(|(&i, &j)| int_binary(op, a[i], b[j]))
                    .collect::<BackendResult<_>>()?,
            )
        }
        DTypeKind::Bool => {
            let (a, b) = (lhs.to_bool_vec(), rhs.to_bool_vec());
            Values::Bool(
                pairs
                    .map(|(&i, &j)| bool_binary(op, a[i], b[j]))
                    .collect::<BackendResult<_>>()?,
            )
        }
    };
    finish(output, shape, values)
}

fn float_binary(op: BinaryOp, x: f64, y: f64) -> f64 {
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::TrueDiv => x / y,
        BinaryOp::Pow => x.powf(y),
        BinaryOp::Maximum => nan_max(x, y),
        BinaryOp::Minimum => nan_min(x, y),
        BinaryOp::And => f64::from(u8::from(x != 0.0 && y != 0.0)),
        BinaryOp::Or => f64::from(u8::from(x != 0.0 || y != 0.0)),
    }
}

fn int_binary(op: BinaryOp, x: i64, y: i64) -> BackendResult<i64> {
    Ok(match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::TrueDiv => {
            return Err(BackendError::execution(
                "true division must produce a float result",
            ))
        }
        BinaryOp::Pow => {
            let exponent = u32::try_from(y).map_err(|_| {
                BackendError::execution(format!(
                    "integers cannot be raised to the exponent {y}"
                ))
            })?;
            x.wrapping_pow(exponent)
        }
        BinaryOp::Maximum => x.max(y),
        BinaryOp::Minimum => x.min(y),
        BinaryOp::And => i64::from(x != 0 && y != 0),
        BinaryOp::Or => i64::from(x != 0 || y != 0),
    })
}

fn bool_binary(op: BinaryOp, x: bool, y: bool) -> BackendResult<bool> {
    match op {
        BinaryOp::And | BinaryOp::Minimum => Ok(x && y),
        BinaryOp::Or | BinaryOp::Maximum => Ok(x || y),
        other => Err(BackendError::unimplemented(
            "binary",
            format!("{other:?} has no boolean result"),
        )),
    }
}

fn nan_max(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else {
        x.max(y)
    }
}

fn nan_min(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else {
        x.min(y)
    }
}

fn op_compare(inputs: &[Tensor], op: CompareOp, output: &TensorType) -> BackendResult<Tensor> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    let (shape, maps) = broadcast_plan(&[lhs.shape(), rhs.shape()])?;
    let pairs = maps[0].iter().zip(&maps[1]);
    let result: Vec<bool> = if lhs.dtype().is_float() || rhs.dtype().is_float() {
        let (a, b) = (lhs.to_f64_vec(), rhs.to_f64_vec());
        pairs.map(|(&i, &j)| compare(op, a[i], b[j])).collect()
    } else {
        let (a, b) = (lhs.to_i64_vec(), rhs.to_i64_vec());
        pairs.map(|(&i, &j)| compare(op, a[i], b[j])).collect()
    };
    finish(output, shape, Values::Bool(result))
}

fn compare<T: PartialOrd>(op: CompareOp, x: T, y: T) -> bool {
    match op {
        CompareOp::Lt => x < y,
        CompareOp::Le => x <= y,
        CompareOp::Gt => x > y,
        CompareOp::Ge => x >= y,
        CompareOp::Eq => x == y,
        CompareOp::Ne => x != y,
    }
}

fn op_switch(inputs: &[Tensor], output: &TensorType) -> BackendResult<Tensor> {
    let cond = &inputs[0];
    let then = inputs[1].cast(output.dtype);
    let otherwise = inputs[2].cast(output.dtype);
    let (shape, maps) = broadcast_plan(&[cond.shape(), then.shape(), otherwise.shape()])?;
    let mask = cond.to_bool_vec();
    let pick = |c: usize, t: usize, e: usize| (mask[c], t, e);
    let choices: Vec<(bool, usize, usize)> = maps[0]
        .iter()
        .zip(&maps[1])
        .zip(&maps[2])
        .map(|((&c, &t), &e)| pick(c, t, e))
        .collect();
    let values = match (then.data(), otherwise.data()) {
        (TensorData::Float(a), TensorData::Float(b)) => Values::Float(select(&choices, a, b)),
        (TensorData::Int(a), TensorData::Int(b)) => Values::Int(select(&choices, a, b)),
        (TensorData::Bool(a), TensorData::Bool(b)) => Values::Bool(select(&choices, a, b)),
        _ => {
            return Err(BackendError::execution(
                "switch branches disagree after casting",
            ))
        }
    };
    finish(output, shape, values)
}

fn select<T: Copy>(choices: &[(bool, usize, usize)], then: &[T], otherwise: &[T]) -> Vec<T> {
    choices
        .iter()
        .map(|&(take, t, e)| if take { then[t] } else { otherwise[e] })
        .collect()
}

fn op_reduce(
    inputs: &[Tensor],
    op: ReduceOp,
    axes: Option<&[usize]>,
    keepdims: bool,
    output: &TensorType,
) -> BackendResult<Tensor> {
    let input = &inputs[0];
    let dims = input.shape().dims();
    let mut reduced = vec![axes.is_none(); dims.len()];
    for &axis in axes.unwrap_or(&[]) {
        if axis >= dims.len() {
            return Err(BackendError::execution(format!(
                "reduce axis {axis} out of range for rank {}",
                dims.len()
            )));
        }
        reduced[axis] = true;
    }

    let kept_dims: Vec<usize> = dims
        .iter()
        .zip(&reduced)
        .map(|(&dim, &r)| if r { 1 } else { dim })
        .collect();
    let kept_strides = compute_strides(&kept_dims);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); kept_dims.iter().product()];
    for (flat, coords) in MultiIndex::new(dims).enumerate() {
        let target: usize = coords
            .iter()
            .zip(&reduced)
            .zip(&kept_strides)
            .map(|((&c, &r), &s)| if r { 0 } else { c * s })
            .sum();
        groups[target].push(flat);
    }

    let values = match op {
        ReduceOp::All | ReduceOp::Any => {
            let data = input.to_bool_vec();
            Values::Bool(
                groups
                    .iter()
                    .map(|group| match op {
                        ReduceOp::All => group.iter().all(|&i| data[i]),
                        _ => group.iter().any(|&i| data[i]),
                    })
                    .collect(),
            )
        }
        ReduceOp::Mean => {
            let data = input.to_f64_vec();
            Values::Float(
                groups
                    .iter()
                    .map(|group| group.iter().map(|&i| data[i]).sum::<f64>() / group.len() as f64)
                    .collect(),
            )
        }
        _ => match values_of(input, output.dtype.kind()) {
            Values::Float(data) => Values::Float(
                groups
                    .iter()
                    .map(|group| reduce_float(op, group.iter().map(|&i| data[i])))
                    .collect::<BackendResult<_>>()?,
            ),
            Values::Int(data) => Values::Int(
                groups
                    .iter()
                    .map(|group| reduce_int(op, group.iter().map(|&i| data[i])))
                    .collect::<BackendResult<_>>()?,
            ),
            Values::Bool(data) => Values::Bool(
                groups
                    .iter()
                    .map(|group| reduce_bool(op, group.iter().map(|&i| data[i])))
                    .collect::<BackendResult<_>>()?,
            ),
        },
    };

    let out_dims: Vec<usize> = if keepdims {
        kept_dims
    } else {
        dims.iter()
            .zip(&reduced)
            .filter(|(_, &r)| !r)
            .map(|(&dim, _)| dim)
            .collect()
    };
    finish(output, Shape::new(out_dims), values)
}

fn reduce_float(op: ReduceOp, mut values: impl Iterator<Item = f64>) -> BackendResult<f64> {
    match op {
        ReduceOp::Sum => Ok(values.sum()),
        ReduceOp::Prod => Ok(values.product()),
        ReduceOp::Max | ReduceOp::Min => {
            let first = values.next().ok_or_else(empty_reduction)?;
            let fold = if op == ReduceOp::Max { nan_max } else { nan_min };
            Ok(values.fold(first, fold))
        }
        other => Err(BackendError::unimplemented(
            "reduce",
            format!("{other:?} over floats"),
        )),
    }
}

fn reduce_int(op: ReduceOp, values: impl Iterator<Item = i64>) -> BackendResult<i64> {
    match op {
        ReduceOp::Sum => Ok(values.fold(0i64, i64::wrapping_add)),
        ReduceOp::Prod => Ok(values.fold(1i64, i64::wrapping_mul)),
        ReduceOp::Max => values.max().ok_or_else(empty_reduction),
        ReduceOp::Min => values.min().ok_or_else(empty_reduction),
        other => Err(BackendError::unimplemented(
            "reduce",
            format!("{other:?} over integers"),
        )),
    }
}

fn reduce_bool(op: ReduceOp, mut values: impl Iterator<Item = bool>) -> BackendResult<bool> {
    match op {
        ReduceOp::Max => values.next().ok_or_else(empty_reduction).map(|first| first || values.any(|v| v)),
        ReduceOp::Min => values.next().ok_or_else(empty_reduction).map(|first| first && values.all(|v| v)),
        other => Err(BackendError::unimplemented(
            "reduce",
            format!("{other:?} over booleans"),
        )),
    }
}

fn empty_reduction() -> BackendError {
    BackendError::execution("zero-size reduction has no identity")
}

fn op_dot(inputs: &[Tensor], output: &TensorType) -> BackendResult<Tensor> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    // Promote vectors to matrices: lhs as a row, rhs as a column.
    let (m, k) = match lhs.shape().dims() {
        [k] => (1, *k),
        [m, k] => (*m, *k),
        dims => return Err(rank_error("dot", dims.len())),
    };
    let (k2, n) = match rhs.shape().dims() {
        [k] => (*k, 1),
        [k, n] => (*k, *n),
        dims => return Err(rank_error("dot", dims.len())),
    };
    if k != k2 {
        return Err(BackendError::execution(format!(
            "dot contraction mismatch: {} and {}",
            lhs.shape(),
            rhs.shape()
        )));
    }

    let mut out_dims = Vec::with_capacity(2);
    if lhs.ndim() == 2 {
        out_dims.push(m);
    }
    if rhs.ndim() == 2 {
        out_dims.push(n);
    }

    let values = match output.dtype.kind() {
        DTypeKind::Float => {
            let (a, b) = (lhs.to_f64_vec(), rhs.to_f64_vec());
            Values::Float(matmul(&a, &b, m, k, n, 0.0, |acc, x, y| acc + x * y))
        }
        _ => {
            let (a, b) = (lhs.to_i64_vec(), rhs.to_i64_vec());
            Values::Int(matmul(&a, &b, m, k, n, 0, |acc, x, y| {
                acc.wrapping_add(x.wrapping_mul(y))
            }))
        }
    };
    finish(output, Shape::new(out_dims), values)
}

fn matmul<T: Copy>(
    a: &[T],
    b: &[T],
    m: usize,
    k: usize,
    n: usize,
    zero: T,
    fma: impl Fn(T, T, T) -> T,
) -> Vec<T> {
    let mut out = vec![zero; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = zero;
            for p in 0..k {
                acc = fma(acc, a[i * k + p], b[p * n + j]);
            }
            out[i * n + j] = acc;
        }
    }
    out
}

fn op_dimshuffle(
    inputs: &[Tensor],
    pattern: &[DimEntry],
    output: &TensorType,
) -> BackendResult<Tensor> {
    let input = &inputs[0];
    let dims = input.shape().dims();
    let strides = input.shape().strides();
    for (axis, &dim) in dims.iter().enumerate() {
        if dim != 1 && !pattern.contains(&DimEntry::Axis(axis)) {
            return Err(BackendError::execution(format!(
                "dimshuffle cannot drop axis {axis} of length {dim}"
            )));
        }
    }

    let mut out_dims = Vec::with_capacity(pattern.len());
    let mut out_strides = Vec::with_capacity(pattern.len());
    for entry in pattern {
        match *entry {
            DimEntry::Axis(axis) => {
                let dim = *dims
                    .get(axis)
                    .ok_or_else(|| rank_error("dimshuffle", dims.len()))?;
                out_dims.push(dim);
                out_strides.push(strides[axis]);
            }
            DimEntry::Broadcast => {
                out_dims.push(1);
                out_strides.push(0);
            }
        }
    }
    let index: Vec<usize> = MultiIndex::new(&out_dims)
        .map(|coords| coords.iter().zip(&out_strides).map(|(c, s)| c * s).sum::<usize>())
        .collect();
    finish(output, Shape::new(out_dims), gather_values(input, &index))
}

fn op_sample(
    spec: &RandomSpec,
    state: &Tensor,
    params: &[Tensor],
    output: &TensorType,
) -> BackendResult<Sample> {
    let seed = state
        .item_i64()
        .ok_or_else(|| BackendError::execution("generator state must be a scalar"))?;
    if params.len() != 2 {
        return Err(BackendError::execution(format!(
            "{} expects 2 parameters, got {}",
            spec.distribution.name(),
            params.len()
        )));
    }

    let mut shapes: Vec<&Shape> = params.iter().map(Tensor::shape).collect();
    if let Some(size) = &spec.size {
        shapes.insert(0, size);
    }
    let (shape, mut maps) = broadcast_plan(&shapes)?;
    if let Some(size) = &spec.size {
        if &shape != size {
            return Err(BackendError::execution(format!(
                "parameters of {} do not broadcast to size {size}",
                spec.distribution.name()
            )));
        }
        maps.remove(0);
    }
    let pairs = maps[0].iter().zip(&maps[1]);

    let mut rng = StdRng::seed_from_u64(seed as u64);
    let values = match spec.distribution {
        Distribution::Uniform => {
            let (low, high) = (params[0].to_f64_vec(), params[1].to_f64_vec());
            Values::Float(
                pairs
                    .map(|(&i, &j)| low[i] + (high[j] - low[i]) * rng.gen::<f64>())
                    .collect(),
            )
        }
        Distribution::Normal => {
            let (loc, scale) = (params[0].to_f64_vec(), params[1].to_f64_vec());
            Values::Float(
                pairs
                    .map(|(&i, &j)| loc[i] + scale[j] * standard_normal(&mut rng))
                    .collect(),
            )
        }
        Distribution::Integers => {
            let (low, high) = (params[0].to_i64_vec(), params[1].to_i64_vec());
            Values::Int(
                pairs
                    .map(|(&i, &j)| {
                        if low[i] >= high[j] {
                            return Err(BackendError::execution(format!(
                                "integers requires low < high, got [{}, {})",
                                low[i], high[j]
                            )));
                        }
                        Ok(rng.gen_range(low[i]..high[j]))
                    })
                    .collect::<BackendResult<_>>()?,
            )
        }
    };
    let next_state = Tensor::from(rng.gen::<u64>() as i64);
    Ok(Sample {
        value: finish(output, shape, values)?,
        next_state,
    })
}

/// One Box-Muller draw.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen::<f64>();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    r * theta.cos()
}

fn expect_arity<'a>(
    inputs: &'a [Tensor],
    arity: usize,
    label: &str,
) -> BackendResult<&'a [Tensor]> {
    if inputs.len() != arity {
        Err(BackendError::execution(format!(
            "{label} expects {arity} inputs, got {}",
            inputs.len()
        )))
    } else {
        Ok(inputs)
    }
}

fn rank_error(label: &str, rank: usize) -> BackendError {
    BackendError::execution(format!("{label} does not support rank {rank}"))
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

/// Row-major iterator over every coordinate of a shape.
struct MultiIndex {
    shape: Vec<usize>,
    current: Vec<usize>,
    first: bool,
}

impl MultiIndex {
    fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            current: vec![0; shape.len()],
            first: true,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.shape.iter().any(|&dim| dim == 0) {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.current.clone());
        }
        for i in (0..self.current.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                return Some(self.current.clone());
            }
            self.current[i] = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize, values: Vec<f64>) -> Tensor {
        Tensor::from_vec([rows, cols], values).unwrap()
    }

    #[test]
    fn multi_index_visits_scalars_once() {
        assert_eq!(MultiIndex::new(&[]).count(), 1);
        assert_eq!(MultiIndex::new(&[2, 3]).count(), 6);
        assert_eq!(MultiIndex::new(&[2, 0]).count(), 0);
    }

    #[test]
    fn binary_broadcasts_rows_against_columns() {
        let col = matrix(2, 1, vec![1.0, 2.0]);
        let row = Tensor::from(vec![10.0, 20.0, 30.0]);
        let out = execute_operation(
            &Op::Binary(BinaryOp::Add),
            &[col, row],
            &TensorType::new(DType::F64, 2),
        )
        .unwrap();
        assert_eq!(out.shape().dims(), &[2, 3]);
        assert_eq!(
            out.to_f64_vec(),
            vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]
        );
    }

    #[test]
    fn incompatible_shapes_fail() {
        let err = execute_operation(
            &Op::Binary(BinaryOp::Mul),
            &[Tensor::from(vec![1.0, 2.0]), Tensor::from(vec![1.0, 2.0, 3.0])],
            &TensorType::new(DType::F64, 1),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Execution { .. }));
    }

    #[test]
    fn reduce_over_axes_with_and_without_keepdims() {
        let x = matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let op = |axes: Option<Vec<usize>>, keepdims| Op::Reduce {
            op: ReduceOp::Sum,
            axes,
            keepdims,
        };
        let rows = execute_operation(
            &op(Some(vec![1]), false),
            &[x.clone()],
            &TensorType::new(DType::F64, 1),
        )
        .unwrap();
        assert_eq!(rows.to_f64_vec(), vec![6.0, 15.0]);

        let cols = execute_operation(
            &op(Some(vec![0]), true),
            &[x.clone()],
            &TensorType::new(DType::F64, 2),
        )
        .unwrap();
        assert_eq!(cols.shape().dims(), &[1, 3]);
        assert_eq!(cols.to_f64_vec(), vec![5.0, 7.0, 9.0]);

        let total = execute_operation(&op(None, false), &[x], &TensorType::scalar(DType::F64))
            .unwrap();
        assert_eq!(total.item_f64(), Some(21.0));
    }

    #[test]
    fn integer_reductions_and_boolean_any() {
        let x = Tensor::from_vec_i64([4], vec![3, -1, 7, 2]).unwrap();
        let max = execute_operation(
            &Op::Reduce {
                op: ReduceOp::Max,
                axes: None,
                keepdims: false,
            },
            &[x.clone()],
            &TensorType::scalar(DType::I64),
        )
        .unwrap();
        assert_eq!(max.item_i64(), Some(7));

        let any = execute_operation(
            &Op::Reduce {
                op: ReduceOp::Any,
                axes: None,
                keepdims: false,
            },
            &[x],
            &TensorType::scalar(DType::Bool),
        )
        .unwrap();
        assert_eq!(any.to_bool_vec(), vec![true]);
    }

    #[test]
    fn dot_handles_matrix_vector_products() {
        let a = matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let v = Tensor::from(vec![1.0, 1.0]);
        let mv = execute_operation(&Op::Dot, &[a.clone(), v.clone()], &TensorType::new(DType::F64, 1))
            .unwrap();
        assert_eq!(mv.to_f64_vec(), vec![3.0, 7.0]);

        let vm = execute_operation(&Op::Dot, &[v.clone(), a.clone()], &TensorType::new(DType::F64, 1))
            .unwrap();
        assert_eq!(vm.to_f64_vec(), vec![4.0, 6.0]);

        let vv = execute_operation(&Op::Dot, &[v.clone(), v], &TensorType::scalar(DType::F64))
            .unwrap();
        assert_eq!(vv.item_f64(), Some(2.0));

        let mm = execute_operation(&Op::Dot, &[a.clone(), a], &TensorType::new(DType::F64, 2))
            .unwrap();
        assert_eq!(mm.to_f64_vec(), vec![7.0, 10.0, 15.0, 22.0]);
    }

    #[test]
    fn dimshuffle_transposes_and_checks_dropped_axes() {
        let x = matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = execute_operation(
            &Op::DimShuffle(vec![DimEntry::Axis(1), DimEntry::Axis(0)]),
            &[x.clone()],
            &TensorType::new(DType::F64, 2),
        )
        .unwrap();
        assert_eq!(t.shape().dims(), &[3, 2]);
        assert_eq!(t.to_f64_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let err = execute_operation(
            &Op::DimShuffle(vec![DimEntry::Axis(0)]),
            &[x],
            &TensorType::new(DType::F64, 1),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Execution { .. }));
    }

    #[test]
    fn switch_selects_per_element() {
        let cond = Tensor::from_bools(Shape::new([3]), vec![true, false, true]).unwrap();
        let out = execute_operation(
            &Op::Switch,
            &[cond, Tensor::from(vec![1.0, 2.0, 3.0]), Tensor::from(0.0)],
            &TensorType::new(DType::F64, 1),
        )
        .unwrap();
        assert_eq!(out.to_f64_vec(), vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn sampling_is_a_pure_function_of_state() {
        let spec = RandomSpec {
            distribution: Distribution::Uniform,
            size: Some(Shape::new([4])),
        };
        let params = [Tensor::from(-1.0), Tensor::from(1.0)];
        let ty = TensorType::new(DType::F64, 1);
        let a = op_sample(&spec, &Tensor::from(9i64), &params, &ty).unwrap();
        let b = op_sample(&spec, &Tensor::from(9i64), &params, &ty).unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(a.next_state, b.next_state);
        assert_ne!(a.next_state, Tensor::from(9i64));
        assert!(a.value.to_f64_vec().iter().all(|v| (-1.0..1.0).contains(v)));

        let c = op_sample(&spec, &a.next_state, &params, &ty).unwrap();
        assert_ne!(a.value, c.value);
    }

    #[test]
    fn integer_draws_respect_bounds() {
        let spec = RandomSpec {
            distribution: Distribution::Integers,
            size: Some(Shape::new([64])),
        };
        let params = [Tensor::from(3i64), Tensor::from(6i64)];
        let out = op_sample(&spec, &Tensor::from(1i64), &params, &TensorType::new(DType::I64, 1))
            .unwrap();
        assert!(out.value.to_i64_vec().iter().all(|v| (3..6).contains(v)));

        let bad = [Tensor::from(6i64), Tensor::from(6i64)];
        assert!(op_sample(&spec, &Tensor::from(1i64), &bad, &TensorType::new(DType::I64, 1)).is_err());
    }

    #[derive(Default)]
    struct ExpOverride {
        hits: std::sync::atomic::AtomicUsize,
    }

    impl CpuKernelInterceptor for ExpOverride {
        fn try_execute(
            &self,
            op: &Op,
            inputs: &[Tensor],
            output: &TensorType,
        ) -> Option<BackendResult<Tensor>> {
            if !matches!(op, Op::Unary(UnaryOp::Exp)) {
                return None;
            }
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Some(Ok(Tensor::full(output.dtype, inputs[0].shape().clone(), -1.0)))
        }
    }

    #[test]
    fn interceptor_short_circuits_matching_kernels() {
        let interceptor = Arc::new(ExpOverride::default());
        let backend = GenericCpuBackend::with_arc(interceptor.clone());
        let ty = TensorType::new(DType::F64, 1);
        let x = Tensor::from(vec![0.0, 1.0]);

        let out = backend.execute(&Op::Unary(UnaryOp::Exp), &[x.clone()], &ty).unwrap();
        assert_eq!(out.to_f64_vec(), vec![-1.0, -1.0]);
        let out = backend.execute(&Op::Unary(UnaryOp::Neg), &[x], &ty).unwrap();
        assert_eq!(out.to_f64_vec(), vec![-0.0, -1.0]);
        assert_eq!(
            backend
                .interceptor()
                .hits
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
        assert_eq!(CpuBackend::new().backend_name(), "cpu");
    }
}
