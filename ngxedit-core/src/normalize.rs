//! Tree normalizer
//!
//! Every editing operation accepts configuration text, a file or an already
//! parsed tree. [`Input`] carries any of those and [`normalize`] turns it into
//! an owned [`Tree`] the operation may freely mutate.

use crate::error::Result;
use crate::template::Fragment;
use ngxedit_syntax::{parse, parse_file, Tree};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Configuration in any of the forms an operation accepts
#[derive(Debug, Clone)]
pub enum Input {
    /// nginx configuration text
    Text(String),

    /// UTF-8 encoded configuration text
    Bytes(Vec<u8>),

    /// Path of a configuration file
    File(PathBuf),

    /// Template to render
    Fragment(Fragment),

    /// Already parsed tree
    Tree(Tree),
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(bytes)
    }
}

impl From<&Path> for Input {
    fn from(path: &Path) -> Self {
        Input::File(path.to_path_buf())
    }
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        Input::File(path)
    }
}

impl From<Fragment> for Input {
    fn from(fragment: Fragment) -> Self {
        Input::Fragment(fragment)
    }
}

impl From<Tree> for Input {
    fn from(tree: Tree) -> Self {
        Input::Tree(tree)
    }
}

impl From<&Tree> for Input {
    fn from(tree: &Tree) -> Self {
        Input::Tree(tree.clone())
    }
}

/// Coerce any accepted input into an owned tree
///
/// A borrowed tree is cloned on the way in, so the caller's copy is never
/// touched by the operation that follows.
pub fn normalize(input: impl Into<Input>) -> Result<Tree> {
    let tree = match input.into() {
        Input::Tree(tree) => tree,
        Input::Text(text) => parse(&text)?,
        Input::Bytes(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            parse(&text)?
        }
        Input::File(path) => {
            tracing::debug!("📄 Reading configuration from {}", path.display());
            parse_file(&path)?
        }
        Input::Fragment(fragment) => fragment.to_tree()?,
    };
    Ok(tree)
}

/// Normalize configuration text read from a stream
pub fn normalize_reader(mut reader: impl Read) -> Result<Tree> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    normalize(bytes)
}
