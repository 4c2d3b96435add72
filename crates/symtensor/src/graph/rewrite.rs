//! Simultaneous node substitution.

use std::collections::HashMap;

use super::{toposort, Node, NodeId};

/// Rebuilds `roots` with every node whose id appears in `replacements` swapped for its
/// replacement, in a single bottom-up pass.
///
/// Replacements are inserted as-is: their own subgraphs are not rewritten, so the result does
/// not depend on the order in which the map is iterated. Nodes with no replaced ancestor are
/// reused unchanged.
pub fn clone_replace(roots: &[Node], replacements: &HashMap<NodeId, Node>) -> Vec<Node> {
    if replacements.is_empty() {
        return roots.to_vec();
    }

    let mut rebuilt: HashMap<NodeId, Node> = HashMap::new();
    for node in toposort(roots) {
        let mapped = if let Some(replacement) = replacements.get(&node.id()) {
            replacement.clone()
        } else if let Some(op) = node.op() {
            let inputs: Vec<Node> = node
                .inputs()
                .iter()
                .map(|child| rebuilt.get(&child.id()).cloned().unwrap_or_else(|| child.clone()))
                .collect();
            let changed = inputs
                .iter()
                .zip(node.inputs())
                .any(|(new, old)| new != old);
            if changed {
                Node::apply(op.clone(), inputs, node.ty())
            } else {
                node.clone()
            }
        } else {
            node.clone()
        };
        rebuilt.insert(node.id(), mapped);
    }

    roots
        .iter()
        .map(|root| rebuilt.get(&root.id()).cloned().unwrap_or_else(|| root.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{dscalar, toposort};

    #[test]
    fn replacements_are_applied_simultaneously() {
        let a = dscalar("a");
        let b = dscalar("b");
        let out = &a + &b;

        // Swap a and b: a sequential rewrite would collapse both onto one variable.
        let replacements: HashMap<NodeId, Node> =
            [(a.id(), b.clone()), (b.id(), a.clone())].into_iter().collect();
        let rewritten = clone_replace(&[out.clone()], &replacements);

        assert_ne!(rewritten[0], out);
        assert_eq!(rewritten[0].inputs(), &[b.clone(), a.clone()]);
    }

    #[test]
    fn untouched_subgraphs_are_shared() {
        let a = dscalar("a");
        let b = dscalar("b");
        let c = dscalar("c");
        let left = &a * 2.0;
        let out = &left + &b;
        let replacements: HashMap<NodeId, Node> = [(b.id(), c.clone())].into_iter().collect();
        let rewritten = clone_replace(&[out], &replacements);
        let order = toposort(&rewritten);
        assert!(order.contains(&left));
        assert!(order.contains(&c));
        assert!(!order.contains(&b));
    }
}
