//! Tree to nginx configuration text

use crate::tree::{Node, Tree};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render a tree as nginx configuration text
///
/// Nested bodies are indented by four spaces and top-level tiers are
/// separated by a blank line. Values are written verbatim, so
/// `parse(&dumps(&tree))` gives back `tree` for any parsed tree.
pub fn dumps(tree: &Tree) -> String {
    let mut out = String::new();
    for (i, node) in tree.nodes.iter().enumerate() {
        if i > 0 && (node.is_block() || tree.nodes[i - 1].is_block()) {
            out.push('\n');
        }
        write_node(&mut out, node, 0);
    }
    out
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    let indent = INDENT.repeat(depth);
    match node {
        Node::Directive { name, value } if value.is_empty() => {
            let _ = writeln!(out, "{}{};", indent, name);
        }
        Node::Directive { name, value } => {
            let _ = writeln!(out, "{}{} {};", indent, name, value);
        }
        Node::Comment(text) => {
            let _ = writeln!(out, "{}#{}", indent, text);
        }
        Node::Block(block) => {
            let _ = writeln!(out, "{}{} {{", indent, block.header.join(" "));
            for child in &block.body {
                write_node(out, child, depth + 1);
            }
            let _ = writeln!(out, "{}}}", indent);
        }
    }
}
