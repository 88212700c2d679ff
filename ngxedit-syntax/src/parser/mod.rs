//! Parser module for nginx configuration text
//!
//! This module provides the lexer and parser producing a [`Tree`](crate::Tree).

pub mod lexer;
pub mod parser;

pub use lexer::{tokenize, Token, LexError, Spanned, Location};
pub use parser::{parse, ParseError, Parser};
