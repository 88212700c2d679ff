//! Directive de-duplication
//!
//! Some directives may appear several times in nginx but should only ever be
//! present once in a block ngxedit manages. After an upsert appends a fresh
//! `listen` or `server_name`, the older copy has to go, otherwise every
//! re-run would grow the block by one line.

use ngxedit_syntax::Node;
use std::collections::HashSet;

/// Keys collapsed after a merge into a server block
pub const SERVER_KEYS: &[&str] = &["listen", "server_name"];

/// Keys collapsed after a certificate upsert
pub const CERTIFICATE_KEYS: &[&str] = &["ssl_certificate", "ssl_certificate_key"];

/// Keep only the last directive for each name in `keys`
///
/// Directives with other names, nested blocks and comments are never
/// dropped, and survivors keep their relative order.
pub fn dedup<S: AsRef<str>>(nodes: Vec<Node>, keys: &[S]) -> Vec<Node> {
    if nodes.len() < 2 || keys.is_empty() {
        return nodes;
    }

    let keys: HashSet<&str> = keys.iter().map(AsRef::as_ref).collect();
    let mut seen = HashSet::new();
    let mut keep = vec![true; nodes.len()];

    for (i, node) in nodes.iter().enumerate().rev() {
        if let Node::Directive { name, .. } = node {
            if keys.contains(name.as_str()) && !seen.insert(name.as_str()) {
                keep[i] = false;
            }
        }
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        tracing::debug!("🧹 Dropped {} superseded directives", dropped);
    }

    nodes
        .into_iter()
        .zip(keep)
        .filter_map(|(node, keep)| keep.then_some(node))
        .collect()
}
