//! Shared state cells: named mutable values that live outside any graph.
//!
//! A cell is an `Arc`-backed handle. Every compiled function that references the cell, and
//! every clone of the handle, observes the same value. The declared [`TensorType`] is fixed at
//! creation; `set_value` never narrows or checks it, so a mismatched value is reported by the
//! next function evaluation that reads the cell.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::graph::{Node, NodeId};
use crate::tensor::{Tensor, TensorType};

static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a shared cell. Calls lock cells in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u64);

struct SharedInner {
    id: CellId,
    node_id: NodeId,
    name: Option<String>,
    ty: TensorType,
    value: Mutex<Tensor>,
}

/// Handle to a shared state cell. Equality and hashing follow cell identity.
#[derive(Clone)]
pub struct SharedCell {
    inner: Arc<SharedInner>,
}

impl SharedCell {
    /// Creates a cell whose declared type is taken from `value`.
    pub fn new(value: impl Into<Tensor>, name: Option<&str>) -> Self {
        let value = value.into();
        SharedCell {
            inner: Arc::new(SharedInner {
                id: CellId(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
                node_id: NodeId::fresh(),
                name: name.map(str::to_string),
                ty: TensorType::of(&value),
                value: Mutex::new(value),
            }),
        }
    }

    /// Shorthand for a named cell.
    pub fn named(value: impl Into<Tensor>, name: &str) -> Self {
        SharedCell::new(value, Some(name))
    }

    /// Returns a copy of the current value.
    pub fn get_value(&self) -> Tensor {
        self.lock().clone()
    }

    /// Overwrites the current value unconditionally.
    pub fn set_value(&self, value: impl Into<Tensor>) {
        *self.lock() = value.into();
    }

    pub fn id(&self) -> CellId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Declared type, fixed at creation.
    pub fn ty(&self) -> TensorType {
        self.inner.ty
    }

    /// Graph node reading this cell. Repeated calls yield nodes with the same identity.
    pub fn expr(&self) -> Node {
        Node::shared(self)
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tensor> {
        self.inner.value.lock().expect("shared cell poisoned")
    }

    pub(crate) fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("<shared {}>", self.inner.id.0),
        }
    }
}

impl PartialEq for SharedCell {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SharedCell {}

impl Hash for SharedCell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for SharedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCell")
            .field("id", &self.inner.id.0)
            .field("name", &self.inner.name)
            .field("ty", &self.inner.ty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    #[test]
    fn clones_observe_the_same_value() {
        let cell = SharedCell::named(0i64, "state");
        let alias = cell.clone();
        alias.set_value(5i64);
        assert_eq!(cell.get_value().item_i64(), Some(5));
        assert_eq!(cell, alias);
    }

    #[test]
    fn set_value_does_not_change_declared_type() {
        let cell = SharedCell::new(0i64, None);
        cell.set_value(1.5);
        assert_eq!(cell.ty(), TensorType::scalar(DType::I64));
        assert_eq!(cell.get_value().dtype(), DType::F64);
    }

    #[test]
    fn expression_nodes_share_identity() {
        let cell = SharedCell::named(1.0, "w");
        assert_eq!(cell.expr(), cell.expr());
        assert_eq!(cell.expr().name(), Some("w"));
    }
}
