//! Compiled functions: typed parameters, outputs and shared-cell updates evaluated as one
//! atomic step.
//!
//! A call binds its arguments, locks every shared cell the function touches in ascending
//! [`CellId`](crate::shared::CellId) order, evaluates outputs and update expressions against
//! that single snapshot, and only then writes the updated cells. Any failure before the
//! commit leaves every cell at its pre-call value.

mod args;
mod builder;
mod copy;
mod eval;
mod param;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::trace;

pub use args::Args;
pub use builder::{function, FunctionBuilder, Outputs};
pub use copy::CopyOptions;
pub use param::In;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::graph::{shared_cells, Node, NodeId};
use crate::shared::SharedCell;
use crate::tensor::Tensor;
use param::Param;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arity {
    Single,
    Sequence,
}

/// Values returned by a call, shaped like the outputs the function was built with.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutput {
    Single(Tensor),
    Sequence(Vec<Tensor>),
}

impl FunctionOutput {
    /// The value of a single-output function.
    pub fn single(self) -> Option<Tensor> {
        match self {
            FunctionOutput::Single(value) => Some(value),
            FunctionOutput::Sequence(_) => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, FunctionOutput::Sequence(_))
    }

    /// All values in output order; a single value becomes a one-element vector.
    pub fn into_vec(self) -> Vec<Tensor> {
        match self {
            FunctionOutput::Single(value) => vec![value],
            FunctionOutput::Sequence(values) => values,
        }
    }
}

/// A compiled, callable graph.
pub struct Function<B: Backend> {
    backend: Arc<B>,
    name: Option<String>,
    params: Vec<Param>,
    keywords: HashMap<String, usize>,
    arity: Arity,
    outputs: Vec<Node>,
    updates: Vec<(SharedCell, Node)>,
    /// Every cell read or written, sorted by id.
    cells: Vec<SharedCell>,
    /// Index into `cells` for each entry of `updates`.
    update_slots: Vec<usize>,
    schedule: Vec<Node>,
}

impl<B: Backend> Function<B> {
    pub(crate) fn assemble(
        backend: Arc<B>,
        name: Option<String>,
        params: Vec<Param>,
        arity: Arity,
        outputs: Vec<Node>,
        updates: Vec<(SharedCell, Node)>,
    ) -> Result<Self> {
        let mut keywords = HashMap::new();
        for (index, param) in params.iter().enumerate() {
            let Some(binding) = &param.binding else {
                continue;
            };
            if keywords.insert(binding.clone(), index).is_some() {
                return Err(Error::Configuration(format!(
                    "two inputs are bound to the name `{binding}`"
                )));
            }
        }

        let mut roots = outputs.clone();
        roots.extend(updates.iter().map(|(_, expr)| expr.clone()));

        let mut by_id: BTreeMap<_, SharedCell> = shared_cells(&roots)
            .into_iter()
            .map(|cell| (cell.id(), cell))
            .collect();
        for (cell, _) in &updates {
            by_id.entry(cell.id()).or_insert_with(|| cell.clone());
        }
        let cells: Vec<SharedCell> = by_id.into_values().collect();
        let update_slots = updates
            .iter()
            .map(|(target, _)| {
                cells
                    .binary_search_by_key(&target.id(), SharedCell::id)
                    .map_err(|_| Error::InvalidGraph(format!("untracked cell `{}`", target.display_name())))
            })
            .collect::<Result<Vec<_>>>()?;

        let schedule = eval::schedule(&roots);

        Ok(Function {
            backend,
            name,
            params,
            keywords,
            arity,
            outputs,
            updates,
            cells,
            update_slots,
            schedule,
        })
    }

    /// Binds `args`, evaluates outputs and updates, and commits the updates.
    pub fn call(&self, args: Args) -> Result<FunctionOutput> {
        let bound = args.bind(&self.params, &self.keywords)?;
        let mut values: HashMap<NodeId, Tensor> = self
            .params
            .iter()
            .map(|param| param.variable.id())
            .zip(bound)
            .collect();

        let mut guards: Vec<_> = self.cells.iter().map(SharedCell::lock).collect();
        for (cell, guard) in self.cells.iter().zip(&guards) {
            if !cell.ty().matches(guard) {
                return Err(Error::type_mismatch(
                    format!("shared cell `{}`", cell.display_name()),
                    cell.ty(),
                    crate::tensor::TensorType::of(guard),
                ));
            }
            values.insert(cell.node_id(), Tensor::clone(guard));
        }

        let values = eval::evaluate(self.backend.as_ref(), &self.schedule, values)?;
        let fetch = |node: &Node| {
            values.get(&node.id()).cloned().ok_or_else(|| {
                Error::InvalidGraph(format!("`{}` was not evaluated", node.display_name()))
            })
        };
        let outputs = self.outputs.iter().map(fetch).collect::<Result<Vec<_>>>()?;
        let committed = self
            .updates
            .iter()
            .map(|(_, expr)| fetch(expr))
            .collect::<Result<Vec<_>>>()?;

        for (slot, value) in self.update_slots.iter().zip(committed) {
            *guards[*slot] = value;
        }
        drop(guards);

        trace!(
            function = %self.display_name(),
            outputs = outputs.len(),
            updates = self.updates.len(),
            "call complete"
        );
        Ok(match self.arity {
            Arity::Single => FunctionOutput::Single(outputs.into_iter().next().ok_or_else(|| {
                Error::InvalidGraph("single-output function has no output".to_string())
            })?),
            Arity::Sequence => FunctionOutput::Sequence(outputs),
        })
    }

    /// Calls with positional arguments only.
    pub fn call_positional(&self, values: impl IntoIterator<Item = Tensor>) -> Result<FunctionOutput> {
        self.call(Args::positional(values))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Parameter variables in positional order.
    pub fn inputs(&self) -> Vec<Node> {
        self.params.iter().map(|param| param.variable.clone()).collect()
    }

    /// Keyword names of the parameters, in positional order.
    pub fn input_names(&self) -> Vec<Option<&str>> {
        self.params.iter().map(|param| param.binding.as_deref()).collect()
    }

    /// Output expressions after substitution.
    pub fn outputs(&self) -> &[Node] {
        &self.outputs
    }

    /// Update rules, explicit ones first, then generator-state updates.
    pub fn updates(&self) -> &[(SharedCell, Node)] {
        &self.updates
    }

    /// Whether calls return a sequence.
    pub fn returns_sequence(&self) -> bool {
        self.arity == Arity::Sequence
    }

    /// Every cell this function reads or writes, by ascending id.
    pub fn shared_cells(&self) -> &[SharedCell] {
        &self.cells
    }

    /// Cells that are read but never updated.
    pub fn read_only_cells(&self) -> Vec<SharedCell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.update_slots.contains(index))
            .map(|(_, cell)| cell.clone())
            .collect()
    }

    /// Default of the parameter bound to `name`, if it has one.
    pub fn default_value(&self, name: &str) -> Option<&Tensor> {
        let index = *self.keywords.get(name)?;
        self.params[index].default.as_ref()
    }

    /// Replaces the default of the parameter bound to `name`.
    pub fn set_default(&mut self, name: &str, value: impl Into<Tensor>) -> Result<()> {
        let index = *self.keywords.get(name).ok_or_else(|| Error::UnknownParameter {
            name: name.to_string(),
        })?;
        if let Some(required) = self.params[index + 1..]
            .iter()
            .find(|param| param.default.is_none())
        {
            return Err(Error::Configuration(format!(
                "cannot give `{name}` a default while `{}` after it has none",
                required.label()
            )));
        }
        let value = self.params[index].filter(value.into())?;
        self.params[index].default = Some(value);
        Ok(())
    }
}

impl<B: Backend> std::fmt::Debug for Function<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("backend", &self.backend.backend_name())
            .field("inputs", &self.input_names())
            .field("outputs", &self.outputs)
            .field("updates", &self.updates.len())
            .finish()
    }
}
