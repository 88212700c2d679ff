//! ngxedit syntax layer
//!
//! This crate owns the configuration block tree and the text collaborators
//! around it: [`parse`] turns nginx configuration text into a [`Tree`] and
//! [`dumps`] turns a tree back into text.
//!
//! # Example
//!
//! ```rust
//! use ngxedit_syntax::{dumps, parse};
//!
//! let tree = parse("server { server_name example.com; listen 80; }").unwrap();
//! assert_eq!(
//!     dumps(&tree),
//!     "server {\n    server_name example.com;\n    listen 80;\n}\n"
//! );
//! ```

pub mod emit;
pub mod parser;
pub mod tree;

pub use emit::dumps;
pub use parser::{parse, tokenize, LexError, ParseError, Token};
pub use tree::{Block, Node, NodePath, StructuralError, Tree};

use std::io::Read;
use std::path::Path;

/// Parse configuration text read from a stream
pub fn load(mut reader: impl Read) -> Result<Tree, ParseError> {
    let mut source = String::new();
    reader.read_to_string(&mut source)?;
    parse(&source)
}

/// Parse a configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Tree, ParseError> {
    let source = std::fs::read_to_string(path.as_ref())?;
    parse(&source)
}
