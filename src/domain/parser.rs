//! Strategy S-expression parser.
//!
//! Recursive descent over the token stream. Nesting depth is passed down
//! explicitly and capped at [`MAX_DEPTH`]; each bracket family only closes on
//! its own closer. Errors carry the byte offset of the offending token.

use crate::domain::ast::{Atom, ListKind, Node};
use crate::domain::error::{EngineError, ParseError};
use crate::domain::token::{Token, TokenKind, tokenize, unescape_string};
use rust_decimal::Decimal;

pub const MAX_DEPTH: usize = 300;
pub const MAX_SOURCE_BYTES: u64 = 10 * 1024 * 1024;

fn closer_for(kind: TokenKind) -> (TokenKind, char, ListKind) {
    match kind {
        TokenKind::LBracket => (TokenKind::RBracket, ']', ListKind::Plain),
        TokenKind::LBrace => (TokenKind::RBrace, '}', ListKind::Map),
        _ => (TokenKind::RParen, ')', ListKind::Plain),
    }
}

struct Parser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    end: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        let end = tokens
            .last()
            .map(|t| t.position + t.lexeme.len())
            .unwrap_or(0);
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&mut self) -> Option<&'t Token<'a>> {
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_discarded() {
                return Some(token);
            }
            self.pos += 1;
        }
        None
    }

    fn advance(&mut self) -> Option<&'t Token<'a>> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn parse_number(&self, token: &Token<'a>) -> Result<Node, ParseError> {
        let literal = token.lexeme.strip_prefix('+').unwrap_or(token.lexeme);
        let value = Decimal::from_str_exact(literal).map_err(|_| {
            ParseError::syntax(
                format!("number literal out of range: {}", token.lexeme),
                token.position,
            )
        })?;
        Ok(Node::atom(Atom::Number(value), token.position))
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Node, ParseError> {
        let token = self
            .advance()
            .ok_or_else(|| ParseError::syntax("unexpected end of input", self.end))?;

        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.parse_list(token, depth + 1)
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                Err(ParseError::syntax(
                    format!("unexpected '{}'", token.lexeme),
                    token.position,
                ))
            }
            TokenKind::String => Ok(Node::atom(
                Atom::Str(unescape_string(token.lexeme)),
                token.position,
            )),
            TokenKind::Float | TokenKind::Integer => self.parse_number(token),
            TokenKind::Keyword | TokenKind::Symbol => Ok(Node::atom(
                Atom::Symbol(token.lexeme.to_string()),
                token.position,
            )),
            // peek() never yields these
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::Comma => Err(
                ParseError::syntax(format!("unexpected '{}'", token.lexeme), token.position),
            ),
        }
    }

    fn parse_list(&mut self, open: &Token<'a>, depth: usize) -> Result<Node, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::syntax(
                format!("maximum nesting depth {} exceeded", MAX_DEPTH),
                open.position,
            ));
        }
        let (closer, closer_char, kind) = closer_for(open.kind);

        let mut children = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::syntax(
                        format!(
                            "expected '{}' to close '{}' at position {}, found end of input",
                            closer_char, open.lexeme, open.position
                        ),
                        self.end,
                    ));
                }
                Some(token) if token.kind == closer => {
                    self.pos += 1;
                    break;
                }
                Some(token) if token.kind.is_closer() => {
                    return Err(ParseError::syntax(
                        format!(
                            "expected '{}' to close '{}' at position {}, found '{}'",
                            closer_char, open.lexeme, open.position, token.lexeme
                        ),
                        token.position,
                    ));
                }
                Some(_) => children.push(self.parse_expr(depth)?),
            }
        }

        if kind == ListKind::Map && children.len() % 2 != 0 {
            return Err(ParseError::syntax(
                format!(
                    "map has {} forms, expected key/value pairs",
                    children.len()
                ),
                open.position,
            ));
        }

        Ok(Node::list(kind, children, open.position))
    }

    fn parse(&mut self) -> Result<Node, ParseError> {
        if self.peek().is_none() {
            return Err(ParseError::syntax("empty input, expected an expression", 0));
        }
        let node = self.parse_expr(0)?;
        if let Some(token) = self.peek() {
            return Err(ParseError::syntax(
                format!("unexpected trailing input '{}'", token.lexeme),
                token.position,
            ));
        }
        Ok(node)
    }
}

pub fn parse(tokens: &[Token<'_>]) -> Result<Node, ParseError> {
    let mut parser = Parser::new(tokens);
    parser.parse()
}

pub fn check_source_size(size: u64) -> Result<(), EngineError> {
    if size > MAX_SOURCE_BYTES {
        return Err(EngineError::ResourceLimit {
            size,
            limit: MAX_SOURCE_BYTES,
        });
    }
    Ok(())
}

/// Size-check, tokenize and parse a whole strategy source.
pub fn parse_source(input: &str) -> Result<Node, EngineError> {
    check_source_size(input.len() as u64)?;
    let tokens = tokenize(input)?;
    Ok(parse(&tokens)?)
}
