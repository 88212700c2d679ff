//! Configuration block tree
//!
//! The tree is the shape every editing operation works on:
//! - A [`Tree`] is an ordered list of tiers (top-level nodes)
//! - A [`Node`] is a `name value;` directive, a `header { body }` block or a comment
//! - A [`NodePath`] addresses a node by child indices from the root

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Shape violations in a tree handed to an editing operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("Directive at {path} has an empty name")]
    EmptyName { path: NodePath },

    #[error("Directive name '{name}' at {path} contains whitespace")]
    InvalidName { path: NodePath, name: String },

    #[error("Block at {path} has an empty header")]
    EmptyHeader { path: NodePath },

    #[error("Malformed node at {path}: {message}")]
    Malformed { path: NodePath, message: String },
}

// ============================================================
// Nodes
// ============================================================

/// A `header { body }` statement, e.g. `server { ... }` or `location /api { ... }`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// Header tokens, e.g. `["location", "/api"]`
    pub header: Vec<String>,

    /// Directives and nested blocks, in document order
    pub body: Vec<Node>,
}

impl Block {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: header.into_iter().map(Into::into).collect(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<Node>) -> Self {
        self.body = body;
        self
    }

    /// First header token (`server`, `location`, `http`, ...)
    pub fn kind(&self) -> Option<&str> {
        self.header.first().map(String::as_str)
    }

    /// Value of the first directive in the body named `name`
    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives(name).next()
    }

    /// Values of every directive in the body named `name`, in order
    pub fn directives<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.body.iter().filter_map(move |node| match node {
            Node::Directive { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Nested blocks in the body
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.body.iter().filter_map(Node::as_block)
    }
}

/// One element of a tree body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// `name value;` — `value` holds the remaining tokens joined by one space
    Directive { name: String, value: String },

    /// Nested `header { body }` statement
    Block(Block),

    /// `# text` — the text after `#`, verbatim
    Comment(String),
}

impl Node {
    pub fn directive(name: impl Into<String>, value: impl Into<String>) -> Self {
        Node::Directive {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Node::Comment(text.into())
    }

    /// Directive name, `None` for blocks and comments
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Directive { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Directive value, `None` for blocks and comments
    pub fn value(&self) -> Option<&str> {
        match self {
            Node::Directive { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Node::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Node::Block(_))
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

// ============================================================
// Paths
// ============================================================

/// Child indices from the root down to a node
///
/// `[2]` is the third tier, `[2, 0]` the first node in that tier's body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the tier the path starts in
    pub fn tier(&self) -> Option<usize> {
        self.0.first().copied()
    }

    /// Index of the node inside its parent's body
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Path one level down
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Path of the enclosing block, `None` for a tier or the root
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self(rest.to_vec())),
            _ => None,
        }
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", index)?;
        }
        write!(f, "]")
    }
}

// ============================================================
// Tree
// ============================================================

/// A parsed configuration: an ordered list of tiers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of tiers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.nodes.get(*first)?;
        for index in rest {
            node = node.as_block()?.body.get(*index)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.nodes.get_mut(*first)?;
        for index in rest {
            node = node.as_block_mut()?.body.get_mut(*index)?;
        }
        Some(node)
    }

    pub fn block(&self, path: &NodePath) -> Option<&Block> {
        self.get(path)?.as_block()
    }

    pub fn block_mut(&mut self, path: &NodePath) -> Option<&mut Block> {
        self.get_mut(path)?.as_block_mut()
    }

    /// Node list a path's last index points into: the tier list for a tier
    /// path, the parent's body otherwise
    pub fn siblings_mut(&mut self, path: &NodePath) -> Option<&mut Vec<Node>> {
        match path.parent() {
            Some(parent) => Some(&mut self.block_mut(&parent)?.body),
            None if path.len() == 1 => Some(&mut self.nodes),
            None => None,
        }
    }

    /// Last top-level block
    pub fn last_block_path(&self) -> Option<NodePath> {
        self.nodes
            .iter()
            .rposition(Node::is_block)
            .map(|i| NodePath::from(vec![i]))
    }

    /// Visit every node depth-first in document order
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&NodePath, &'a Node)) {
        fn go<'a>(nodes: &'a [Node], at: &NodePath, visit: &mut impl FnMut(&NodePath, &'a Node)) {
            for (i, node) in nodes.iter().enumerate() {
                let path = at.child(i);
                visit(&path, node);
                if let Node::Block(block) = node {
                    go(&block.body, &path, visit);
                }
            }
        }
        go(&self.nodes, &NodePath::root(), &mut visit);
    }

    /// Check the directive/block shape invariant on every node
    pub fn validate(&self) -> Result<(), StructuralError> {
        let mut result = Ok(());
        self.walk(|path, node| {
            if result.is_err() {
                return;
            }
            result = match node {
                Node::Directive { name, .. } if name.is_empty() => {
                    Err(StructuralError::EmptyName { path: path.clone() })
                }
                Node::Directive { name, .. } if name.chars().any(char::is_whitespace) => {
                    Err(StructuralError::InvalidName {
                        path: path.clone(),
                        name: name.clone(),
                    })
                }
                Node::Block(block) if block.header.first().is_none_or(|h| h.is_empty()) => {
                    Err(StructuralError::EmptyHeader { path: path.clone() })
                }
                Node::Comment(text) if text.contains(['\n', '\r']) => {
                    Err(StructuralError::Malformed {
                        path: path.clone(),
                        message: "comment spans several lines".to_string(),
                    })
                }
                _ => Ok(()),
            };
        });
        result
    }

    // ============================================================
    // Wire form
    // ============================================================

    /// Untyped nested-list form: `[name, value]` leaves, `[[header...], [body...]]`
    /// blocks and `["# text", "\n"]` comments
    pub fn to_value(&self) -> Value {
        Value::Array(self.nodes.iter().map(node_to_value).collect())
    }

    /// Inverse of [`Tree::to_value`]
    pub fn from_value(value: &Value) -> Result<Self, StructuralError> {
        let root = NodePath::root();
        let nodes = nodes_from_value(value, &root)?;
        let tree = Self { nodes };
        tree.validate()?;
        Ok(tree)
    }
}

fn node_to_value(node: &Node) -> Value {
    match node {
        Node::Directive { name, value } => {
            Value::Array(vec![Value::String(name.clone()), Value::String(value.clone())])
        }
        Node::Comment(text) => {
            Value::Array(vec![Value::String(format!("#{}", text)), Value::String("\n".into())])
        }
        Node::Block(block) => Value::Array(vec![
            Value::Array(block.header.iter().cloned().map(Value::String).collect()),
            Value::Array(block.body.iter().map(node_to_value).collect()),
        ]),
    }
}

fn nodes_from_value(value: &Value, at: &NodePath) -> Result<Vec<Node>, StructuralError> {
    let items = value.as_array().ok_or_else(|| StructuralError::Malformed {
        path: at.clone(),
        message: "expected a list of nodes".to_string(),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| node_from_value(item, &at.child(i)))
        .collect()
}

fn node_from_value(value: &Value, at: &NodePath) -> Result<Node, StructuralError> {
    let malformed = |message: &str| StructuralError::Malformed {
        path: at.clone(),
        message: message.to_string(),
    };

    let parts = value
        .as_array()
        .ok_or_else(|| malformed("expected a list"))?;

    match parts.as_slice() {
        [Value::Array(header), body @ Value::Array(_)] => {
            let header = header
                .iter()
                .map(|token| token.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| malformed("block header tokens must be strings"))?;
            Ok(Node::Block(Block {
                header,
                body: nodes_from_value(body, at)?,
            }))
        }
        [Value::String(name), Value::String(_)] if name.starts_with('#') => {
            Ok(Node::Comment(name[1..].to_string()))
        }
        [Value::String(name), Value::String(value)] => Ok(Node::directive(name, value)),
        [_, _] => Err(malformed("directive name and value must be strings")),
        _ => Err(malformed(&format!(
            "expected 2 elements, found {}",
            parts.len()
        ))),
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Tree::from_value(&value).map_err(serde::de::Error::custom)
    }
}
