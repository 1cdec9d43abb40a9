//! Strategy source tokenizer.
//!
//! Scans text into a lazy stream of [`Token`]s. At each position every rule in
//! [`RULES`] reports how many bytes it can match; the longest match wins and
//! ties go to the rule listed first. Strings are scanned by a dedicated
//! routine so escapes are honoured. Whitespace, `;` comments and commas are
//! recognised but never yielded.

use crate::domain::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    String,
    Float,
    Integer,
    Keyword,
    Symbol,
}

impl TokenKind {
    pub fn is_discarded(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::Comma
        )
    }

    pub fn is_closer(self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub position: usize,
}

/// Returns the byte length matched at the start of the input, 0 for no match.
type Matcher = fn(&str) -> usize;

/// Float precedes Integer, and both precede Symbol, so an equal-length tie
/// such as `-5` (integer or symbol) resolves to the number.
const RULES: &[(TokenKind, Matcher)] = &[
    (TokenKind::Whitespace, match_whitespace),
    (TokenKind::Comment, match_comment),
    (TokenKind::Comma, match_char::<','>),
    (TokenKind::LParen, match_char::<'('>),
    (TokenKind::RParen, match_char::<')'>),
    (TokenKind::LBracket, match_char::<'['>),
    (TokenKind::RBracket, match_char::<']'>),
    (TokenKind::LBrace, match_char::<'{'>),
    (TokenKind::RBrace, match_char::<'}'>),
    (TokenKind::Float, match_float),
    (TokenKind::Integer, match_integer),
    (TokenKind::Keyword, match_keyword),
    (TokenKind::Symbol, match_symbol),
];

fn match_char<const C: char>(input: &str) -> usize {
    if input.starts_with(C) { C.len_utf8() } else { 0 }
}

fn match_whitespace(input: &str) -> usize {
    input
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(input.len())
}

fn match_comment(input: &str) -> usize {
    if !input.starts_with(';') {
        return 0;
    }
    input.find('\n').unwrap_or(input.len())
}

fn match_sign(input: &str) -> usize {
    if input.starts_with('-') || input.starts_with('+') {
        1
    } else {
        0
    }
}

fn match_digits(input: &str) -> usize {
    input
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(input.len())
}

fn match_integer(input: &str) -> usize {
    let sign = match_sign(input);
    let digits = match_digits(&input[sign..]);
    if digits == 0 { 0 } else { sign + digits }
}

fn match_float(input: &str) -> usize {
    let whole = match_integer(input);
    if whole == 0 || !input[whole..].starts_with('.') {
        return 0;
    }
    let fraction = match_digits(&input[whole + 1..]);
    if fraction == 0 {
        0
    } else {
        whole + 1 + fraction
    }
}

fn is_symbol_start(ch: char) -> bool {
    ch.is_alphabetic() || "*+!-_?<>=/.%&$".contains(ch)
}

fn is_symbol_char(ch: char) -> bool {
    is_symbol_start(ch) || ch.is_ascii_digit() || "'#:".contains(ch)
}

fn match_symbol_tail(input: &str) -> usize {
    input
        .char_indices()
        .find(|(_, ch)| !is_symbol_char(*ch))
        .map(|(i, _)| i)
        .unwrap_or(input.len())
}

fn match_symbol(input: &str) -> usize {
    match input.chars().next() {
        Some(ch) if is_symbol_start(ch) => {
            ch.len_utf8() + match_symbol_tail(&input[ch.len_utf8()..])
        }
        _ => 0,
    }
}

fn match_keyword(input: &str) -> usize {
    if !input.starts_with(':') {
        return 0;
    }
    let tail = match_symbol_tail(&input[1..]);
    if tail == 0 { 0 } else { 1 + tail }
}

/// Scan a string literal starting at the opening quote. Returns the byte
/// length including both quotes.
fn scan_string(input: &str, start: usize) -> Result<usize, ParseError> {
    let mut chars = input.char_indices().skip(1);
    while let Some((i, ch)) = chars.next() {
        match ch {
            '"' => return Ok(i + 1),
            '\\' => match chars.next() {
                Some((_, '"' | '\\' | 'n' | 't' | 'r')) => {}
                Some((_, other)) => {
                    return Err(ParseError::lexical(
                        format!("invalid escape sequence '\\{}'", other),
                        start + i,
                    ));
                }
                None => break,
            },
            _ => {}
        }
    }
    Err(ParseError::lexical("unterminated string", start))
}

/// Strip the quotes from a string lexeme and resolve its escapes.
pub fn unescape_string(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lazy token stream over a source string. Stops after the first error.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            failed: false,
        }
    }

    fn scan(&mut self) -> Result<Token<'a>, ParseError> {
        let start = self.pos;
        let rest = &self.input[start..];

        let (kind, len) = if rest.starts_with('"') {
            (TokenKind::String, scan_string(rest, start)?)
        } else {
            let mut best: Option<(TokenKind, usize)> = None;
            for &(kind, matcher) in RULES {
                let len = matcher(rest);
                if len > 0 && best.is_none_or(|(_, best_len)| len > best_len) {
                    best = Some((kind, len));
                }
            }
            best.ok_or_else(|| {
                let ch = rest.chars().next().unwrap_or_default();
                ParseError::lexical(format!("unexpected character '{}'", ch), start)
            })?
        };

        self.pos += len;
        Ok(Token {
            kind,
            lexeme: &self.input[start..start + len],
            position: start,
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.pos < self.input.len() {
            match self.scan() {
                Ok(token) if token.kind.is_discarded() => continue,
                Ok(token) => return Some(Ok(token)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    Tokenizer::new(input).collect()
}
