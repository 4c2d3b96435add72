//! Seeded random streams.
//!
//! Every draw creates its own generator-state cell and a random node reading it. The stream
//! keeps a log of `(state cell, next-state expression)` pairs; compiled functions that reach a
//! random node pick up the matching pair as a default update, so each call advances the
//! generator unless the function opts out.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::config;
use crate::error::{Error, Result};
use crate::graph::{Distribution, Node, Op, RandomSpec};
use crate::shared::SharedCell;
use crate::tensor::{DType, Shape, Tensor, TensorType};

/// Type of every generator-state cell.
pub const STATE_TYPE: TensorType = TensorType {
    dtype: DType::I64,
    ndim: 0,
};

/// Builds the node that evaluates to the generator state following the draw `rv`.
pub(crate) fn next_state(rv: &Node) -> Node {
    Node::apply(Op::RngNextState, vec![rv.clone()], STATE_TYPE)
}

fn state_tensor(seed: u64) -> Tensor {
    Tensor::from(seed as i64)
}

struct StreamState {
    seed: u64,
    seed_source: StdRng,
    issued: HashSet<u64>,
    updates: Vec<(SharedCell, Node)>,
}

impl StreamState {
    fn new(seed: u64) -> Self {
        StreamState {
            seed,
            seed_source: StdRng::seed_from_u64(seed),
            issued: HashSet::new(),
            updates: Vec::new(),
        }
    }

    fn next_seed(&mut self) -> u64 {
        loop {
            let candidate = self.seed_source.gen::<u64>();
            if self.issued.insert(candidate) {
                return candidate;
            }
        }
    }
}

/// A named source of random-variable nodes.
pub struct RandomStream {
    state: Mutex<StreamState>,
}

impl RandomStream {
    /// Creates a stream. Without a seed, `SYMTENSOR_SEED` is used when set, else OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed
            .or(config().seed)
            .unwrap_or_else(|| StdRng::from_entropy().gen());
        RandomStream {
            state: Mutex::new(StreamState::new(seed)),
        }
    }

    /// Master seed most recently applied.
    pub fn current_seed(&self) -> u64 {
        self.lock().seed
    }

    /// Draws a random variable and records its state update.
    ///
    /// `params` must hold exactly the distribution's parameters. With `size` the result has
    /// that shape and every parameter must broadcast to it; without one the result takes the
    /// broadcast shape of the parameters.
    pub fn draw(
        &self,
        distribution: Distribution,
        params: Vec<Node>,
        size: Option<&[usize]>,
    ) -> Result<Node> {
        if params.len() != distribution.num_params() {
            return Err(Error::InvalidGraph(format!(
                "{} takes {} parameters, got {}",
                distribution.name(),
                distribution.num_params(),
                params.len()
            )));
        }
        let max_rank = params.iter().map(Node::ndim).max().unwrap_or(0);
        let ndim = match size {
            Some(dims) if max_rank > dims.len() => {
                return Err(Error::InvalidGraph(format!(
                    "{} parameters of rank {max_rank} cannot broadcast to size of rank {}",
                    distribution.name(),
                    dims.len()
                )));
            }
            Some(dims) => dims.len(),
            None => max_rank,
        };
        let dtype = match distribution {
            Distribution::Uniform | Distribution::Normal => config().float_dtype,
            Distribution::Integers => {
                if let Some(bad) = params.iter().find(|p| p.dtype().is_float()) {
                    return Err(Error::InvalidGraph(format!(
                        "integers bounds must be integral, got {}",
                        bad.ty()
                    )));
                }
                DType::I64
            }
        };

        let mut state = self.lock();
        let seed = state.next_seed();
        let cell_name = format!("rng_{}_{}", distribution.name(), state.updates.len());
        let cell = SharedCell::new(state_tensor(seed), Some(&cell_name));

        let spec = RandomSpec {
            distribution,
            size: size.map(|dims| Shape::new(dims.to_vec())),
        };
        let mut inputs = Vec::with_capacity(params.len() + 1);
        inputs.push(cell.expr());
        inputs.extend(params);
        let rv = Node::apply(Op::Random(spec), inputs, TensorType::new(dtype, ndim));
        state.updates.push((cell, next_state(&rv)));
        Ok(rv)
    }

    /// Uniform samples on `[low, high)`.
    pub fn uniform(
        &self,
        low: impl Into<Node>,
        high: impl Into<Node>,
        size: Option<&[usize]>,
    ) -> Result<Node> {
        self.draw(Distribution::Uniform, vec![low.into(), high.into()], size)
    }

    /// Gaussian samples with mean `loc` and standard deviation `scale`.
    pub fn normal(
        &self,
        loc: impl Into<Node>,
        scale: impl Into<Node>,
        size: Option<&[usize]>,
    ) -> Result<Node> {
        self.draw(Distribution::Normal, vec![loc.into(), scale.into()], size)
    }

    /// Integer samples on `[low, high)`.
    pub fn integers(
        &self,
        low: impl Into<Node>,
        high: impl Into<Node>,
        size: Option<&[usize]>,
    ) -> Result<Node> {
        self.draw(Distribution::Integers, vec![low.into(), high.into()], size)
    }

    /// Replaces the master seed and re-seeds every state cell drawn so far.
    ///
    /// Derived seeds are taken from the new master seed in draw order, so reseeding with the
    /// same value always restores the same generator states.
    pub fn seed(&self, seed: u64) {
        let mut guard = self.lock();
        let updates = std::mem::take(&mut guard.updates);
        let mut fresh = StreamState::new(seed);
        for (cell, _) in &updates {
            cell.set_value(state_tensor(fresh.next_seed()));
        }
        fresh.updates = updates;
        debug!(seed, cells = fresh.updates.len(), "reseeded random stream");
        *guard = fresh;
    }

    /// The update log: one `(state cell, next-state expression)` pair per draw.
    pub fn state_updates(&self) -> Vec<(SharedCell, Node)> {
        self.lock().updates.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().expect("random stream poisoned")
    }
}

impl std::fmt::Debug for RandomStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RandomStream")
            .field("seed", &state.seed)
            .field("draws", &state.updates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dscalar;

    fn state_values(stream: &RandomStream) -> Vec<i64> {
        stream
            .state_updates()
            .iter()
            .filter_map(|(cell, _)| cell.get_value().item_i64())
            .collect()
    }

    #[test]
    fn each_draw_gets_a_distinct_state_cell() -> crate::Result<()> {
        let stream = RandomStream::new(Some(7));
        let a = stream.uniform(0.0, 1.0, Some(&[3]))?;
        let b = stream.normal(0.0, 1.0, None)?;
        assert_eq!(a.ndim(), 1);
        assert_eq!(b.ndim(), 0);

        let updates = stream.state_updates();
        assert_eq!(updates.len(), 2);
        assert_ne!(updates[0].0, updates[1].0);
        assert_eq!(a.inputs()[0], updates[0].0.expr());
        assert_eq!(updates[1].1.inputs()[0], b);

        let seeds = state_values(&stream);
        assert_ne!(seeds[0], seeds[1]);
        Ok(())
    }

    #[test]
    fn reseeding_is_deterministic() -> crate::Result<()> {
        let stream = RandomStream::new(Some(1));
        stream.uniform(0.0, 1.0, None)?;
        stream.integers(0i64, 10i64, Some(&[2, 2]))?;

        stream.seed(42);
        let first = state_values(&stream);
        for (cell, _) in stream.state_updates() {
            cell.set_value(0i64);
        }
        stream.seed(42);
        assert_eq!(state_values(&stream), first);
        assert_eq!(stream.current_seed(), 42);

        let other = RandomStream::new(Some(42));
        other.uniform(0.0, 1.0, None)?;
        other.integers(0i64, 10i64, Some(&[2, 2]))?;
        assert_eq!(state_values(&other), first);
        Ok(())
    }

    #[test]
    fn draw_validates_parameters() {
        let stream = RandomStream::new(Some(0));
        let err = stream
            .draw(Distribution::Uniform, vec![dscalar("low")], None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));

        let err = stream.integers(0.5, 2.0, None).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));

        let wide = crate::graph::dmatrix("m");
        let err = stream.normal(&wide, 1.0, Some(&[4])).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));
        assert!(stream.state_updates().is_empty());
    }
}
