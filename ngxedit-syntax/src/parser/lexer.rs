//! Lexer for nginx configuration text
//!
//! Tokenizes the nginx block syntax.
//!
//! Key features:
//! - Whitespace (newlines included) only separates tokens
//! - `{` `}` open and close blocks, `;` terminates a directive
//! - `'...'` and `"..."` quoted strings are kept verbatim, quotes included
//! - `# ...` comments are emitted as tokens so they survive a round trip

use logos::{Logos, Span};
use std::fmt;

/// Source location for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl From<Span> for Location {
    fn from(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

/// A token with its location in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Location,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: impl Into<Location>) -> Self {
        Self {
            value,
            span: span.into(),
        }
    }
}

/// Token types for nginx configuration syntax
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // ============================================================
    // Structural
    // ============================================================
    #[token("{")]
    BlockOpen,

    #[token("}")]
    BlockClose,

    #[token(";")]
    Semicolon,

    /// `# ...` up to the end of the line, without the leading `#`
    #[regex(r"#[^\n]*", |lex| lex.slice()[1..].trim_end_matches('\r').to_string())]
    Comment(String),

    // ============================================================
    // Values
    // ============================================================

    /// Quoted string literal, quotes included: "..." or '...'
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| lex.slice().to_string())]
    QuotedString(String),

    /// Bare word: directive names, paths, numbers, `$variables`, `${variables}`
    ///
    /// `#` only opens a comment at the start of a token; inside a word it is literal.
    #[regex(
        r#"([^ \t\r\n\f{};#"'$]|\$\{[A-Za-z0-9_]*\}|\$)([^ \t\r\n\f{};"'$]|\$\{[A-Za-z0-9_]*\}|\$)*"#,
        |lex| lex.slice().to_string()
    )]
    Word(String),
}

impl Token {
    /// Text of a value token as it appears in the source
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Token::Word(s) | Token::QuotedString(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::BlockOpen => write!(f, "{{"),
            Token::BlockClose => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::Comment(s) => write!(f, "#{}", s),
            Token::QuotedString(s) | Token::Word(s) => write!(f, "{}", s),
        }
    }
}

/// Lexer result type
pub type LexResult = Result<Vec<Spanned<Token>>, LexError>;

/// Lexer error
#[derive(Debug, Clone, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character at position {position}")]
    UnexpectedChar { position: usize },
}

impl LexError {
    /// Byte offset of the offending input
    pub fn position(&self) -> usize {
        match self {
            LexError::UnexpectedChar { position } => *position,
        }
    }
}

/// Tokenize an nginx configuration source string
pub fn tokenize(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(token) => tokens.push(Spanned::new(token, span)),
            // An unterminated quote is the usual culprit: nothing else is
            // outside the word class.
            Err(_) => return Err(LexError::UnexpectedChar { position: span.start }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn test_basic_directive() {
        let tokens = values("listen 443 ssl;");
        assert_eq!(
            tokens,
            vec![
                Token::Word("listen".to_string()),
                Token::Word("443".to_string()),
                Token::Word("ssl".to_string()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_block() {
        let tokens = values("location /api0 {\n  proxy_pass http://127.0.0.1:5000;\n}");
        assert_eq!(tokens[0], Token::Word("location".to_string()));
        assert_eq!(tokens[1], Token::Word("/api0".to_string()));
        assert_eq!(tokens[2], Token::BlockOpen);
        assert_eq!(tokens[3], Token::Word("proxy_pass".to_string()));
        assert_eq!(tokens[4], Token::Word("http://127.0.0.1:5000".to_string()));
        assert_eq!(tokens[5], Token::Semicolon);
        assert_eq!(tokens[6], Token::BlockClose);
    }

    #[test]
    fn test_quotes_and_comments() {
        let source = r#"
            # Emitted by ngxedit.server
            add_header 'Cache-Control' "no-store";
        "#;
        let tokens = values(source);
        assert_eq!(tokens[0], Token::Comment(" Emitted by ngxedit.server".to_string()));
        assert_eq!(tokens[1], Token::Word("add_header".to_string()));
        assert_eq!(tokens[2], Token::QuotedString("'Cache-Control'".to_string()));
        assert_eq!(tokens[3], Token::QuotedString("\"no-store\"".to_string()));
    }

    #[test]
    fn test_variables() {
        let tokens = values("return 301 https://${host}$request_uri;");
        assert_eq!(tokens[2], Token::Word("https://${host}$request_uri".to_string()));
        assert_eq!(tokens[3], Token::Semicolon);
    }

    #[test]
    fn test_hash_starts_comment_only_at_token_start() {
        let tokens = values("proxy_pass http://x/#a; # note");
        assert_eq!(tokens[1], Token::Word("http://x/#a".to_string()));
        assert_eq!(tokens[2], Token::Semicolon);
        assert_eq!(tokens[3], Token::Comment(" note".to_string()));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize("root \"/var/www;").unwrap_err();
        assert_eq!(err.position(), 5);
    }
}
