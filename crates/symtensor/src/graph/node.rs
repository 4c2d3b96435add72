//! Reference-counted expression nodes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::graph::Op;
use crate::shared::SharedCell;
use crate::tensor::{DType, Tensor, TensorType};

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a node. Every reference to one shared cell uses the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub(crate) fn fresh() -> Self {
        NodeId(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a node stands for.
pub enum NodeKind {
    /// Symbolic placeholder bound to a call argument.
    Variable,
    Constant(Tensor),
    /// Reference to the current value of a shared cell.
    Shared(SharedCell),
    Apply { op: Op, inputs: Vec<Node> },
}

struct NodeData {
    id: NodeId,
    ty: TensorType,
    name: Option<String>,
    kind: NodeKind,
}

/// Immutable handle to an expression-graph node. Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    /// Creates a fresh symbolic variable.
    pub fn variable(ty: TensorType, name: Option<&str>) -> Node {
        Node(Arc::new(NodeData {
            id: NodeId::fresh(),
            ty,
            name: name.map(str::to_string),
            kind: NodeKind::Variable,
        }))
    }

    /// Wraps a host value as a graph constant.
    pub fn constant(value: impl Into<Tensor>) -> Node {
        let value = value.into();
        Node(Arc::new(NodeData {
            id: NodeId::fresh(),
            ty: TensorType::of(&value),
            name: None,
            kind: NodeKind::Constant(value),
        }))
    }

    pub(crate) fn shared(cell: &SharedCell) -> Node {
        Node(Arc::new(NodeData {
            id: cell.node_id(),
            ty: cell.ty(),
            name: cell.name().map(str::to_string),
            kind: NodeKind::Shared(cell.clone()),
        }))
    }

    pub(crate) fn apply(op: Op, inputs: Vec<Node>, ty: TensorType) -> Node {
        Node(Arc::new(NodeData {
            id: NodeId::fresh(),
            ty,
            name: None,
            kind: NodeKind::Apply { op, inputs },
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn ty(&self) -> TensorType {
        self.0.ty
    }

    pub fn dtype(&self) -> DType {
        self.0.ty.dtype
    }

    pub fn ndim(&self) -> usize {
        self.0.ty.ndim
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Child nodes in operand order; empty for leaves.
    pub fn inputs(&self) -> &[Node] {
        match &self.0.kind {
            NodeKind::Apply { inputs, .. } => inputs,
            _ => &[],
        }
    }

    pub fn op(&self) -> Option<&Op> {
        match &self.0.kind {
            NodeKind::Apply { op, .. } => Some(op),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.0.kind, NodeKind::Variable)
    }

    pub fn as_shared(&self) -> Option<&SharedCell> {
        match &self.0.kind {
            NodeKind::Shared(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Tensor> {
        match &self.0.kind {
            NodeKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Name for diagnostics: the node's own name, or its op label, or its id.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_string();
        }
        match &self.0.kind {
            NodeKind::Variable => format!("<var {}>", self.0.id.0),
            NodeKind::Constant(value) => value.to_string(),
            NodeKind::Shared(_) => format!("<shared {}>", self.0.id.0),
            NodeKind::Apply { op, .. } => format!("{}#{}", op, self.0.id.0),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.display_name(), self.0.ty)
    }
}

impl From<&Node> for Node {
    fn from(node: &Node) -> Self {
        node.clone()
    }
}

impl From<Tensor> for Node {
    fn from(value: Tensor) -> Self {
        Node::constant(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::constant(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::constant(value)
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::constant(value)
    }
}

impl From<&SharedCell> for Node {
    fn from(cell: &SharedCell) -> Self {
        cell.expr()
    }
}
