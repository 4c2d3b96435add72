//! Graph traversal helpers.

use std::collections::{BTreeMap, HashSet};

use crate::shared::{CellId, SharedCell};

use super::{Node, NodeId};

/// Returns every node reachable from `roots`, children before parents.
///
/// Roots are visited in order and operands left to right, so the result is deterministic.
pub fn toposort(roots: &[Node]) -> Vec<Node> {
    let mut order = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(Node, bool)> = roots.iter().rev().map(|n| (n.clone(), false)).collect();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        for child in node.inputs().iter().rev() {
            if !visited.contains(&child.id()) {
                stack.push((child.clone(), false));
            }
        }
    }
    order
}

/// Returns the ids of every node reachable from `roots`, including the roots.
pub fn ancestors(roots: &[Node]) -> HashSet<NodeId> {
    toposort(roots).iter().map(Node::id).collect()
}

/// Returns the shared cells read anywhere under `roots`, ordered by cell id.
pub fn shared_cells(roots: &[Node]) -> Vec<SharedCell> {
    let cells: BTreeMap<CellId, SharedCell> = toposort(roots)
        .iter()
        .filter_map(|node| node.as_shared().map(|cell| (cell.id(), cell.clone())))
        .collect();
    cells.into_values().collect()
}

/// Returns the symbolic variables reachable from `roots`, in traversal order.
pub fn variables(roots: &[Node]) -> Vec<Node> {
    toposort(roots)
        .into_iter()
        .filter(Node::is_variable)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dscalar;

    #[test]
    fn toposort_places_children_first_and_deduplicates() {
        let x = dscalar("x");
        let y = dscalar("y");
        let sum = &x + &y;
        let out = &sum * &sum;
        let order = toposort(&[out.clone()]);
        assert_eq!(order.len(), 4);
        let pos = |n: &Node| order.iter().position(|m| m == n).unwrap();
        assert!(pos(&x) < pos(&sum));
        assert!(pos(&y) < pos(&sum));
        assert!(pos(&sum) < pos(&out));
        assert_eq!(order.last(), Some(&out));
    }

    #[test]
    fn shared_and_variable_queries() {
        let x = dscalar("x");
        let state = SharedCell::named(0.0, "state");
        let other = SharedCell::named(1.0, "other");
        let out = &x + &state.expr() + &other.expr() * &state.expr();
        let cells = shared_cells(&[out.clone()]);
        assert_eq!(cells, vec![state, other]);
        assert_eq!(variables(&[out.clone()]), vec![x.clone()]);
        assert!(ancestors(&[out]).contains(&x.id()));
    }
}
