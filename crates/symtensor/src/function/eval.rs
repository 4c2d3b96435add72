//! Single-pass graph evaluation over a precomputed schedule.

use std::collections::HashMap;

use crate::backend::{Backend, BackendError};
use crate::error::{Error, Result};
use crate::graph::{Node, NodeId, NodeKind, Op};
use crate::tensor::{Tensor, TensorType};

/// Orders `roots` for evaluation: random draws and their ancestors first, then everything
/// else, each part in dependency order.
pub(crate) fn schedule(roots: &[Node]) -> Vec<Node> {
    let all = crate::graph::toposort(roots);
    let draws: Vec<Node> = all
        .iter()
        .filter(|node| node.op().is_some_and(Op::is_random))
        .cloned()
        .collect();
    let mut order = crate::graph::toposort(&draws);
    let placed: std::collections::HashSet<NodeId> = order.iter().map(Node::id).collect();
    order.extend(all.into_iter().filter(|node| !placed.contains(&node.id())));
    order
}

/// Evaluates `schedule` with leaf values already present in `values`.
///
/// Every node is computed at most once, so a random node appearing several times in the
/// graph contributes a single sample.
pub(crate) fn evaluate<B: Backend + ?Sized>(
    backend: &B,
    schedule: &[Node],
    mut values: HashMap<NodeId, Tensor>,
) -> Result<HashMap<NodeId, Tensor>> {
    let mut next_states: HashMap<NodeId, Tensor> = HashMap::new();
    for node in schedule {
        if values.contains_key(&node.id()) {
            continue;
        }
        let value = match node.kind() {
            NodeKind::Constant(value) => value.clone(),
            NodeKind::Variable | NodeKind::Shared(_) => {
                return Err(Error::InvalidGraph(format!(
                    "no value bound for `{}`",
                    node.display_name()
                )));
            }
            NodeKind::Apply { op, inputs } => {
                let operands = inputs
                    .iter()
                    .map(|input| {
                        values.get(&input.id()).ok_or_else(|| {
                            Error::InvalidGraph(format!(
                                "`{}` evaluated before its operand `{}`",
                                node.display_name(),
                                input.display_name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<&Tensor>>>()?;
                match op {
                    Op::Random(spec) => {
                        let (state, params) = split_state(&operands, node)?;
                        let params: Vec<Tensor> = params.iter().map(|t| (*t).clone()).collect();
                        let sample = backend.sample(spec, state, &params, &node.ty())?;
                        next_states.insert(node.id(), sample.next_state);
                        sample.value
                    }
                    Op::RngNextState => next_states
                        .get(&inputs[0].id())
                        .cloned()
                        .ok_or_else(|| {
                            Error::InvalidGraph(format!(
                                "`{}` has no preceding draw",
                                node.display_name()
                            ))
                        })?,
                    _ => {
                        let operands: Vec<Tensor> = operands.into_iter().cloned().collect();
                        backend.execute(op, &operands, &node.ty())?
                    }
                }
            }
        };
        check_output(node, &value)?;
        values.insert(node.id(), value);
    }
    Ok(values)
}

fn split_state<'a>(operands: &'a [&'a Tensor], node: &Node) -> Result<(&'a Tensor, &'a [&'a Tensor])> {
    operands
        .split_first()
        .map(|(state, params)| (*state, params))
        .ok_or_else(|| Error::InvalidGraph(format!("`{}` has no generator state", node.display_name())))
}

fn check_output(node: &Node, value: &Tensor) -> Result<()> {
    let expected: TensorType = node.ty();
    if expected.matches(value) {
        return Ok(());
    }
    Err(BackendError::execution(format!(
        "`{}` produced {} but {} was expected",
        node.display_name(),
        TensorType::of(value),
        expected
    ))
    .into())
}
