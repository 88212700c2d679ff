//! Block locator
//!
//! Finds nodes by selector. Traversal is read-only and returns [`NodePath`]s;
//! mutation is left to the upsert operations.

use ngxedit_syntax::{Block, Node, NodePath, Tree};
use std::fmt;

/// Key used to locate a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `server_name` directive with exactly this value
    ServerName(String),

    /// `listen` directive equal to the target or starting with `target + " "`
    Listen(String),

    /// Plain `location <path>` block, compared without one leading `/`
    Location(String),
}

impl Selector {
    pub fn server_name(name: impl Into<String>) -> Self {
        Selector::ServerName(name.into())
    }

    pub fn listen(target: impl Into<String>) -> Self {
        Selector::Listen(target.into())
    }

    pub fn location(path: impl Into<String>) -> Self {
        Selector::Location(path.into())
    }

    /// Does this node satisfy the selector
    pub fn matches(&self, node: &Node) -> bool {
        match (self, node) {
            (Selector::ServerName(target), Node::Directive { name, value }) => {
                name == "server_name" && value == target
            }
            (Selector::Listen(target), Node::Directive { name, value }) => {
                name == "listen" && listen_matches(value, target)
            }
            (Selector::Location(path), Node::Block(block)) => location_matches(block, path),
            _ => false,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ServerName(name) => write!(f, "server_name {}", name),
            Selector::Listen(target) => write!(f, "listen {}", target),
            Selector::Location(path) => write!(f, "location {}", path),
        }
    }
}

/// `"443"` matches `"443"` and `"443 ssl"`, never `"4430"`
pub fn listen_matches(value: &str, target: &str) -> bool {
    value
        .strip_prefix(target)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

/// `location` block with a header of exactly `location <path>`, compared
/// without one leading `/`
///
/// Blocks with a modifier (`=`, `~`, `^~`, ...) are separate locations in
/// nginx and never match a plain path.
pub fn location_matches(block: &Block, path: &str) -> bool {
    match block.header.as_slice() {
        [kind, location] if kind == "location" => strip_slash(location) == strip_slash(path),
        _ => false,
    }
}

fn strip_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Every node matching `selector`, depth-first in document order
pub fn find(tree: &Tree, selector: &Selector) -> Vec<NodePath> {
    let mut found = Vec::new();
    tree.walk(|path, node| {
        if selector.matches(node) {
            found.push(path.clone());
        }
    });
    tracing::debug!("🔎 {} matched {} nodes", selector, found.len());
    found
}

/// Blocks whose own body holds a node matching `selector`, in document order
pub fn find_enclosing(tree: &Tree, selector: &Selector) -> Vec<NodePath> {
    let mut found: Vec<NodePath> = Vec::new();
    for parent in find(tree, selector).iter().filter_map(NodePath::parent) {
        if !found.contains(&parent) {
            found.push(parent);
        }
    }
    found
}

/// Does the block listen on 443 in any form
pub fn is_secure(block: &Block) -> bool {
    block.directives("listen").any(|v| listen_matches(v, "443"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngxedit_syntax::parse;

    const TWO_SERVERS: &str = r#"
        server {
            server_name example.com;
            listen 80;
            location /api { proxy_pass http://127.0.0.1:5000; }
        }
        server {
            server_name example.com;
            listen 443 ssl;
            location api { proxy_pass http://127.0.0.1:5000; }
            location = /health { return 200; }
        }
    "#;

    #[test]
    fn test_listen_matching() {
        assert!(listen_matches("443", "443"));
        assert!(listen_matches("443 ssl", "443"));
        assert!(!listen_matches("4430", "443"));
        assert!(!listen_matches("80", "443"));
        assert!(!listen_matches("[::]:443 ssl", "443"));
    }

    #[test]
    fn test_find_server_name() {
        let tree = parse(TWO_SERVERS).unwrap();
        let paths = find(&tree, &Selector::server_name("example.com"));
        assert_eq!(
            paths,
            vec![NodePath::from(vec![0, 0]), NodePath::from(vec![1, 0])]
        );
        assert!(find(&tree, &Selector::server_name("example.org")).is_empty());
    }

    #[test]
    fn test_find_listen() {
        let tree = parse(TWO_SERVERS).unwrap();
        assert_eq!(
            find(&tree, &Selector::listen("443")),
            vec![NodePath::from(vec![1, 1])]
        );
    }

    #[test]
    fn test_find_location_normalizes_slash() {
        let tree = parse(TWO_SERVERS).unwrap();
        let expected = vec![NodePath::from(vec![0, 2]), NodePath::from(vec![1, 2])];
        assert_eq!(find(&tree, &Selector::location("/api")), expected);
        assert_eq!(find(&tree, &Selector::location("api")), expected);
        assert!(find(&tree, &Selector::location("/health")).is_empty());
    }

    #[test]
    fn test_location_modifiers_are_distinct() {
        let tree = parse("location = /api { } location ~ /api { } location /api { }").unwrap();
        assert_eq!(
            find(&tree, &Selector::location("api")),
            vec![NodePath::from(vec![2])]
        );
    }

    #[test]
    fn test_find_nested_servers() {
        let tree = parse("http { server { server_name example.com; listen 80; } }").unwrap();
        assert_eq!(
            find_enclosing(&tree, &Selector::server_name("example.com")),
            vec![NodePath::from(vec![0, 0])]
        );
    }

    #[test]
    fn test_is_secure() {
        let tree = parse(TWO_SERVERS).unwrap();
        let plain = tree.block(&NodePath::from(vec![0])).unwrap();
        let secure = tree.block(&NodePath::from(vec![1])).unwrap();
        assert!(!is_secure(plain));
        assert!(is_secure(secure));
    }
}
