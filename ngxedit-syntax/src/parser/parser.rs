//! nginx configuration parser
//!
//! Recursive descent parser that converts tokens into a [`Tree`].

use crate::parser::lexer::{tokenize, LexError, Location, Spanned, Token};
use crate::tree::{Block, Node, Tree};
use thiserror::Error;

/// Parser error types
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Lexer error: {0}")]
    Lex(#[from] LexError),

    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Byte offset the error points at, when it has one
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Lex(e) => Some(e.position()),
            ParseError::UnexpectedToken { position, .. } => Some(*position),
            ParseError::UnexpectedEof { .. } | ParseError::Io(_) => None,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parser state
pub struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from source text
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self { tokens, pos: 0 })
    }

    /// Parse the whole configuration
    pub fn parse(&mut self) -> ParseResult<Tree> {
        let mut nodes = Vec::new();

        while !self.is_eof() {
            if self.check(&Token::BlockClose) {
                return Err(self.unexpected("directive or end of input"));
            }
            nodes.push(self.parse_node()?);
        }

        Ok(Tree::new(nodes))
    }

    // ========================================
    // Statements
    // ========================================

    fn parse_node(&mut self) -> ParseResult<Node> {
        if let Some(Token::Comment(text)) = self.peek().cloned() {
            self.advance();
            return Ok(Node::Comment(text));
        }

        let name = self.expect_word()?;
        let mut args = Vec::new();

        loop {
            match self.advance() {
                Some(Token::Word(arg)) | Some(Token::QuotedString(arg)) => args.push(arg),
                // Comments between arguments carry nothing the tree can hold
                Some(Token::Comment(_)) => {}
                Some(Token::Semicolon) => {
                    return Ok(Node::Directive {
                        name,
                        value: args.join(" "),
                    });
                }
                Some(Token::BlockOpen) => {
                    let mut header = Vec::with_capacity(args.len() + 1);
                    header.push(name);
                    header.extend(args);
                    let body = self.parse_body()?;
                    return Ok(Node::Block(Block { header, body }));
                }
                Some(Token::BlockClose) => {
                    self.pos -= 1;
                    return Err(self.unexpected("';' or '{'"));
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: format!("';' or '{{' after '{}'", name),
                    });
                }
            }
        }
    }

    fn parse_body(&mut self) -> ParseResult<Vec<Node>> {
        let mut body = Vec::new();

        loop {
            match self.peek() {
                Some(Token::BlockClose) => {
                    self.advance();
                    return Ok(body);
                }
                Some(_) => body.push(self.parse_node()?),
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "'}'".to_string(),
                    });
                }
            }
        }
    }

    // ========================================
    // Token utilities
    // ========================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.value)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.value.clone();
        self.pos += 1;
        Some(token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    fn expect_word(&mut self) -> ParseResult<String> {
        if let Some(Token::Word(s)) = self.peek().cloned() {
            self.advance();
            Ok(s)
        } else if self.is_eof() {
            Err(ParseError::UnexpectedEof {
                expected: "directive name".to_string(),
            })
        } else {
            Err(self.unexpected("directive name"))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            position: self.current_span().start,
            expected: expected.to_string(),
            found: self
                .peek()
                .map(|t| format!("'{}'", t))
                .unwrap_or_else(|| "end of input".to_string()),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current_span(&self) -> Location {
        self.tokens
            .get(self.pos)
            .map(|s| s.span)
            .unwrap_or(Location { start: 0, end: 0 })
    }
}

/// Parse an nginx configuration source string into a tree
///
/// Comments standing on their own between statements become
/// [`Node::Comment`]. A comment placed between the arguments of a directive
/// or block header has no slot in the tree and is dropped.
pub fn parse(source: &str) -> ParseResult<Tree> {
    let mut parser = Parser::new(source)?;
    let tree = parser.parse()?;
    tracing::trace!("Parsed {} tiers", tree.len());
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodePath;

    #[test]
    fn test_parse_empty() {
        let tree = parse("").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_parse_server() {
        let tree = parse(
            r#"
            server {
                server_name example.com;
                listen 443 ssl;
                location /api0 {
                    proxy_set_header Host $http_host;
                    proxy_pass http://127.0.0.1:5000/awesome;
                }
            }
        "#,
        )
        .unwrap();

        assert_eq!(tree.len(), 1);
        let server = tree.block(&NodePath::from(vec![0])).unwrap();
        assert_eq!(server.header, vec!["server"]);
        assert_eq!(server.directive("server_name"), Some("example.com"));
        assert_eq!(server.directive("listen"), Some("443 ssl"));

        let location = server.blocks().next().unwrap();
        assert_eq!(location.header, vec!["location", "/api0"]);
        assert_eq!(location.directive("proxy_set_header"), Some("Host $http_host"));
    }

    #[test]
    fn test_parse_comment_kept() {
        let tree = parse("server {\n # Emitted by ngxedit.server\n listen 80;\n}").unwrap();
        let server = tree.block(&NodePath::from(vec![0])).unwrap();
        assert_eq!(server.body[0], Node::comment(" Emitted by ngxedit.server"));
    }

    #[test]
    fn test_parse_valueless_directive() {
        let tree = parse("server { goodbye; }").unwrap();
        let server = tree.block(&NodePath::from(vec![0])).unwrap();
        assert_eq!(server.body[0], Node::directive("goodbye", ""));
    }

    #[test]
    fn test_parse_quoted_values() {
        let tree = parse(r#"add_header 'Access-Control-Max-Age' 1728000;"#).unwrap();
        assert_eq!(
            tree.nodes[0],
            Node::directive("add_header", "'Access-Control-Max-Age' 1728000")
        );
    }

    #[test]
    fn test_comment_between_arguments_dropped() {
        let tree = parse("listen 443 # tls\n ssl;").unwrap();
        assert_eq!(tree.nodes, vec![Node::directive("listen", "443 ssl")]);
    }

    #[test]
    fn test_hash_inside_word() {
        let tree = parse("proxy_pass http://x/#a;").unwrap();
        assert_eq!(tree.nodes, vec![Node::directive("proxy_pass", "http://x/#a")]);
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse("server { listen 80 }").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 19, .. }));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("server { listen 80;").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_stray_close() {
        let err = parse("listen 80; }").unwrap_err();
        assert_eq!(err.position(), Some(11));
    }
}
