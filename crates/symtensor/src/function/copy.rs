//! Deriving new functions from compiled ones.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{Arity, Function};
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::graph::{clone_replace, NodeId};
use crate::shared::SharedCell;

/// Options for [`Function::copy`].
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    swap: Vec<(SharedCell, SharedCell)>,
    delete_updates: bool,
    name: Option<String>,
}

impl CopyOptions {
    pub fn new() -> Self {
        CopyOptions::default()
    }

    /// Makes the copy use `replacement` wherever the original uses `original`.
    pub fn swap(mut self, original: &SharedCell, replacement: &SharedCell) -> Self {
        self.swap.push((original.clone(), replacement.clone()));
        self
    }

    /// Drops every update rule from the copy.
    pub fn delete_updates(mut self, delete: bool) -> Self {
        self.delete_updates = delete;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<B: Backend> Function<B> {
    /// Builds a new function over this one's substituted graphs.
    ///
    /// The copy always returns a sequence, even when this function returns a single value.
    /// Parameters and their current defaults carry over.
    pub fn copy(&self, options: CopyOptions) -> Result<Function<B>> {
        let CopyOptions {
            swap,
            delete_updates,
            name,
        } = options;

        let mut cell_map: HashMap<_, SharedCell> = HashMap::with_capacity(swap.len());
        let mut replacements = HashMap::with_capacity(swap.len());
        for (original, replacement) in &swap {
            if original.ty() != replacement.ty() {
                return Err(Error::type_mismatch(
                    format!("swap of `{}`", original.display_name()),
                    original.ty(),
                    replacement.ty(),
                ));
            }
            if cell_map.insert(original.id(), replacement.clone()).is_some() {
                return Err(Error::Configuration(format!(
                    "shared cell `{}` is swapped more than once",
                    original.display_name()
                )));
            }
            replacements.insert(original.node_id(), replacement.expr());
        }

        let kept_updates: &[(SharedCell, _)] = if delete_updates { &[] } else { &self.updates };
        let mut roots = self.outputs.clone();
        roots.extend(kept_updates.iter().map(|(_, expr)| expr.clone()));
        let mut rewritten = clone_replace(&roots, &replacements);
        let update_exprs = rewritten.split_off(self.outputs.len());
        let outputs = rewritten;

        let mut targets: HashSet<NodeId> = HashSet::new();
        let mut updates = Vec::with_capacity(update_exprs.len());
        for ((target, _), expr) in kept_updates.iter().zip(update_exprs) {
            let target = cell_map.get(&target.id()).unwrap_or(target).clone();
            if !targets.insert(target.node_id()) {
                return Err(Error::Configuration(format!(
                    "shared cell `{}` would be updated more than once",
                    target.display_name()
                )));
            }
            updates.push((target, expr));
        }

        let name = name.or_else(|| self.name.clone());
        let copy = Function::assemble(
            self.backend.clone(),
            name,
            self.params.clone(),
            Arity::Sequence,
            outputs,
            updates,
        )?;
        debug!(
            function = %copy.display_name(),
            source = %self.display_name(),
            swapped = swap.len(),
            delete_updates,
            updates = copy.updates.len(),
            "copied function"
        );
        Ok(copy)
    }
}
