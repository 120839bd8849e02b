//! AST inspection utilities.

use crate::slq::ast::{Ast, Node, NodeTag};

/// Read-only queries over a parsed [`Ast`], used by the planner and tests.
pub struct Inspector<'a> {
    ast: &'a Ast,
}

impl<'a> Inspector<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self { ast }
    }

    /// Number of nodes with the given tag, anywhere in the tree.
    pub fn count_nodes(&self, tag: NodeTag) -> usize {
        self.find_nodes(tag).len()
    }

    /// All nodes with the given tag, in depth-first source order.
    pub fn find_nodes(&self, tag: NodeTag) -> Vec<&'a Node> {
        let mut found = Vec::new();
        for seg in &self.ast.segments {
            collect(seg, tag, &mut found);
        }
        found
    }
}

fn collect<'a>(node: &'a Node, tag: NodeTag, found: &mut Vec<&'a Node>) {
    if node.tag() == tag {
        found.push(node);
    }
    for child in node.children() {
        collect(child, tag, found);
    }
}
