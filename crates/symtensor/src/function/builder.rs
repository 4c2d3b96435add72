//! Compilation: validates inputs, updates and givens, then assembles a [`Function`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::param::{In, Param};
use super::{Arity, Function};
use crate::backend::Backend;
use crate::config::{config, UnusedInputPolicy};
use crate::error::{Error, Result};
use crate::graph::{ancestors, clone_replace, toposort, variables, Node, NodeId, Op};
use crate::random;
use crate::shared::SharedCell;

/// What a function returns: one expression, or a sequence of them.
#[derive(Debug, Clone)]
pub enum Outputs {
    Single(Node),
    Sequence(Vec<Node>),
}

impl Outputs {
    fn into_parts(self) -> (Arity, Vec<Node>) {
        match self {
            Outputs::Single(node) => (Arity::Single, vec![node]),
            Outputs::Sequence(nodes) => (Arity::Sequence, nodes),
        }
    }
}

impl From<Node> for Outputs {
    fn from(node: Node) -> Self {
        Outputs::Single(node)
    }
}

impl From<&Node> for Outputs {
    fn from(node: &Node) -> Self {
        Outputs::Single(node.clone())
    }
}

impl From<Vec<Node>> for Outputs {
    fn from(nodes: Vec<Node>) -> Self {
        Outputs::Sequence(nodes)
    }
}

impl From<&[Node]> for Outputs {
    fn from(nodes: &[Node]) -> Self {
        Outputs::Sequence(nodes.to_vec())
    }
}

impl<const N: usize> From<[Node; N]> for Outputs {
    fn from(nodes: [Node; N]) -> Self {
        Outputs::Sequence(nodes.to_vec())
    }
}

/// Collects everything needed to compile a function.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    inputs: Vec<In>,
    outputs: Outputs,
    updates: Vec<(SharedCell, Node)>,
    givens: Vec<(Node, Node)>,
    no_default_updates: bool,
    suppressed: Vec<SharedCell>,
    on_unused_input: Option<UnusedInputPolicy>,
    name: Option<String>,
}

impl FunctionBuilder {
    pub fn new<I, T>(inputs: I, outputs: impl Into<Outputs>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<In>,
    {
        FunctionBuilder {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into(),
            updates: Vec::new(),
            givens: Vec::new(),
            no_default_updates: false,
            suppressed: Vec::new(),
            on_unused_input: None,
            name: None,
        }
    }

    /// Replaces `cell` with `expr` after every call.
    pub fn update(mut self, cell: &SharedCell, expr: impl Into<Node>) -> Self {
        self.updates.push((cell.clone(), expr.into()));
        self
    }

    pub fn updates(mut self, updates: impl IntoIterator<Item = (SharedCell, Node)>) -> Self {
        self.updates.extend(updates);
        self
    }

    /// Substitutes `replacement` for every occurrence of `target` in this function's graphs.
    pub fn given(mut self, target: &Node, replacement: impl Into<Node>) -> Self {
        self.givens.push((target.clone(), replacement.into()));
        self
    }

    pub fn givens(mut self, givens: impl IntoIterator<Item = (Node, Node)>) -> Self {
        self.givens.extend(givens);
        self
    }

    /// Drops the generator-state updates contributed by reachable random draws.
    pub fn no_default_updates(mut self, suppress: bool) -> Self {
        self.no_default_updates = suppress;
        self
    }

    /// Drops default updates for the listed generator-state cells only.
    pub fn no_default_updates_for(mut self, cells: impl IntoIterator<Item = SharedCell>) -> Self {
        self.suppressed.extend(cells);
        self
    }

    /// Overrides `SYMTENSOR_ON_UNUSED_INPUT` for this function.
    pub fn on_unused_input(mut self, policy: UnusedInputPolicy) -> Self {
        self.on_unused_input = Some(policy);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build<B: Backend>(self, backend: Arc<B>) -> Result<Function<B>> {
        let FunctionBuilder {
            inputs,
            outputs,
            updates,
            givens,
            no_default_updates,
            suppressed,
            on_unused_input,
            name,
        } = self;

        let params = collect_params(inputs)?;
        check_updates(&updates)?;
        let replacements = collect_givens(&givens)?;

        let (arity, outputs) = outputs.into_parts();
        let n_outputs = outputs.len();
        let mut roots = outputs;
        roots.extend(updates.iter().map(|(_, expr)| expr.clone()));
        let mut rewritten = clone_replace(&roots, &replacements);
        let update_exprs = rewritten.split_off(n_outputs);
        let outputs = rewritten;

        let mut updates: Vec<(SharedCell, Node)> = updates
            .into_iter()
            .map(|(cell, _)| cell)
            .zip(update_exprs)
            .collect();
        for (cell, expr) in &updates {
            if expr.ty() != cell.ty() {
                return Err(Error::type_mismatch(
                    format!("update of `{}`", cell.display_name()),
                    cell.ty(),
                    expr.ty(),
                ));
            }
        }

        if !no_default_updates {
            let mut roots = outputs.clone();
            roots.extend(updates.iter().map(|(_, expr)| expr.clone()));
            let defaults = default_updates(&roots, &updates, &suppressed);
            updates.extend(defaults);
        }

        let policy = on_unused_input.unwrap_or(config().on_unused_input);
        check_reachability(&params, &outputs, &updates, policy, name.as_deref())?;

        let function = Function::assemble(backend, name, params, arity, outputs, updates)?;
        debug!(
            function = %function.display_name(),
            inputs = function.params.len(),
            outputs = function.outputs.len(),
            updates = function.updates.len(),
            read_only = function.read_only_cells().len(),
            "compiled function"
        );
        Ok(function)
    }
}

/// Compiles `outputs` over `inputs` with no updates or givens.
pub fn function<B, I, T>(backend: Arc<B>, inputs: I, outputs: impl Into<Outputs>) -> Result<Function<B>>
where
    B: Backend,
    I: IntoIterator<Item = T>,
    T: Into<In>,
{
    FunctionBuilder::new(inputs, outputs).build(backend)
}

fn collect_params(inputs: Vec<In>) -> Result<Vec<Param>> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut defaults_started = false;
    let mut params = Vec::with_capacity(inputs.len());
    for spec in inputs {
        let param = Param::from_spec(spec)?;
        if !seen.insert(param.variable.id()) {
            return Err(Error::Configuration(format!(
                "input `{}` is listed more than once",
                param.label()
            )));
        }
        match (&param.default, defaults_started) {
            (Some(_), _) => defaults_started = true,
            (None, true) => {
                return Err(Error::Configuration(format!(
                    "input `{}` without a default follows an input with a default",
                    param.label()
                )));
            }
            (None, false) => {}
        }
        params.push(param);
    }
    Ok(params)
}

fn check_updates(updates: &[(SharedCell, Node)]) -> Result<()> {
    let mut targets = HashSet::new();
    for (cell, _) in updates {
        if !targets.insert(cell.id()) {
            return Err(Error::Configuration(format!(
                "shared cell `{}` is updated more than once",
                cell.display_name()
            )));
        }
    }
    Ok(())
}

fn collect_givens(givens: &[(Node, Node)]) -> Result<HashMap<NodeId, Node>> {
    let mut replacements = HashMap::with_capacity(givens.len());
    for (target, replacement) in givens {
        if target.ty() != replacement.ty() {
            return Err(Error::type_mismatch(
                format!("substitution of `{}`", target.display_name()),
                target.ty(),
                replacement.ty(),
            ));
        }
        if replacements
            .insert(target.id(), replacement.clone())
            .is_some()
        {
            return Err(Error::Configuration(format!(
                "`{}` is substituted more than once",
                target.display_name()
            )));
        }
    }
    for (target, replacement) in givens {
        let reach = ancestors(std::slice::from_ref(replacement));
        if let Some((blocked, _)) = givens.iter().find(|(other, _)| reach.contains(&other.id())) {
            return Err(Error::Configuration(format!(
                "replacement for `{}` depends on `{}`, which is itself substituted",
                target.display_name(),
                blocked.display_name()
            )));
        }
    }
    Ok(replacements)
}

/// Generator-state updates for every random draw reachable from `roots` whose state cell is
/// neither updated explicitly nor suppressed.
fn default_updates(
    roots: &[Node],
    explicit: &[(SharedCell, Node)],
    suppressed: &[SharedCell],
) -> Vec<(SharedCell, Node)> {
    let mut claimed: HashSet<_> = explicit.iter().map(|(cell, _)| cell.id()).collect();
    claimed.extend(suppressed.iter().map(SharedCell::id));

    let mut defaults = Vec::new();
    for node in toposort(roots) {
        if !node.op().is_some_and(Op::is_random) {
            continue;
        }
        let Some(cell) = node.inputs().first().and_then(Node::as_shared) else {
            continue;
        };
        if claimed.insert(cell.id()) {
            defaults.push((cell.clone(), random::next_state(&node)));
        }
    }
    defaults
}

fn check_reachability(
    params: &[Param],
    outputs: &[Node],
    updates: &[(SharedCell, Node)],
    policy: UnusedInputPolicy,
    name: Option<&str>,
) -> Result<()> {
    let mut roots = outputs.to_vec();
    roots.extend(updates.iter().map(|(_, expr)| expr.clone()));

    let declared: HashSet<NodeId> = params.iter().map(|p| p.variable.id()).collect();
    if let Some(missing) = variables(&roots)
        .into_iter()
        .find(|var| !declared.contains(&var.id()))
    {
        return Err(Error::Configuration(format!(
            "graph depends on `{}`, which is not among the inputs",
            missing.display_name()
        )));
    }

    let reachable = ancestors(&roots);
    for param in params {
        if reachable.contains(&param.variable.id()) {
            continue;
        }
        match policy {
            UnusedInputPolicy::Raise => {
                return Err(Error::Configuration(format!(
                    "input `{}` is not used to compute any output or update",
                    param.label()
                )));
            }
            UnusedInputPolicy::Warn => warn!(
                function = name.unwrap_or("<anonymous>"),
                input = %param.label(),
                "unused input"
            ),
            UnusedInputPolicy::Ignore => {}
        }
    }
    Ok(())
}
