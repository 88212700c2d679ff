//! Error types for ngxedit

use ngxedit_syntax::{ParseError, StructuralError};
use thiserror::Error;

/// Result type for ngxedit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ngxedit
///
/// A selector that matches nothing is not an error: lookups return an empty
/// list and upserts hand back the tree unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// Input text is not valid configuration syntax
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A tree violates the directive/block shape
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// A required template parameter is missing or blank
    #[error("Template '{template}' is missing required field '{field}'")]
    MissingTemplateField {
        template: &'static str,
        field: &'static str,
    },

    /// Edit plan could not be loaded
    #[error("Plan error: {0}")]
    Plan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
