//! Strategy AST data structures.
//!
//! - `Atom`: number, string or symbol leaf (keywords are symbols starting with `:`)
//! - `ListKind`: plain list (from `()` or `[]`) or map (from `{}`)
//! - `Node`: a leaf or list together with the byte offset it started at

use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Number(Decimal),
    Str(String),
    Symbol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Plain,
    /// Alternating key/value children; always an even count.
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Atom(Atom),
    List { kind: ListKind, children: Vec<Node> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: usize,
}

impl Node {
    pub fn atom(atom: Atom, position: usize) -> Self {
        Self {
            kind: NodeKind::Atom(atom),
            position,
        }
    }

    pub fn list(kind: ListKind, children: Vec<Node>, position: usize) -> Self {
        Self {
            kind: NodeKind::List { kind, children },
            position,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Atom(Atom::Symbol(name)) => Some(name),
            _ => None,
        }
    }

    pub fn is_keyword(&self) -> bool {
        self.as_symbol().is_some_and(|s| s.starts_with(':'))
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::List { children, .. } => Some(children),
            NodeKind::Atom(_) => None,
        }
    }

    /// Operator name when this node is a plain list headed by a non-keyword symbol.
    pub fn head_symbol(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::List {
                kind: ListKind::Plain,
                children,
            } => children
                .first()
                .filter(|head| !head.is_keyword())
                .and_then(Node::as_symbol),
            _ => None,
        }
    }

    /// Nesting depth, counting each list level (atoms are depth 0).
    pub fn depth(&self) -> usize {
        match &self.kind {
            NodeKind::Atom(_) => 0,
            NodeKind::List { children, .. } => {
                1 + children.iter().map(Node::depth).max().unwrap_or(0)
            }
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            _ => write!(f, "{}", ch)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Number(n) => write!(f, "{}", n),
            Atom::Str(s) => write_escaped(f, s),
            Atom::Symbol(s) => f.write_str(s),
        }
    }
}

/// Canonical source rendering; plain lists always print with parentheses.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Atom(atom) => write!(f, "{}", atom),
            NodeKind::List { kind, children } => {
                let (open, close) = match kind {
                    ListKind::Plain => ("(", ")"),
                    ListKind::Map => ("{", "}"),
                };
                f.write_str(open)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(close)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Node {
        Node::atom(Atom::Symbol(name.into()), 0)
    }

    fn num(n: i64) -> Node {
        Node::atom(Atom::Number(Decimal::from(n)), 0)
    }

    fn string(s: &str) -> Node {
        Node::atom(Atom::Str(s.into()), 0)
    }

    #[test]
    fn head_symbol_of_call() {
        let call = Node::list(ListKind::Plain, vec![sym("asset"), string("SPY")], 0);
        assert_eq!(call.head_symbol(), Some("asset"));
    }

    #[test]
    fn head_symbol_ignores_keywords_maps_and_sequences() {
        let keyword_head = Node::list(ListKind::Plain, vec![sym(":window"), num(14)], 0);
        assert_eq!(keyword_head.head_symbol(), None);

        let map = Node::list(ListKind::Map, vec![sym("a"), num(1)], 0);
        assert_eq!(map.head_symbol(), None);

        let inner = Node::list(ListKind::Plain, vec![sym("asset"), string("SPY")], 0);
        let sequence = Node::list(ListKind::Plain, vec![inner], 0);
        assert_eq!(sequence.head_symbol(), None);

        let empty = Node::list(ListKind::Plain, vec![], 0);
        assert_eq!(empty.head_symbol(), None);
    }

    #[test]
    fn keyword_detection() {
        assert!(sym(":window").is_keyword());
        assert!(!sym("window").is_keyword());
        assert!(!string(":window").is_keyword());
    }

    #[test]
    fn depth_counts_list_levels() {
        assert_eq!(num(1).depth(), 0);
        let inner = Node::list(ListKind::Plain, vec![num(1)], 0);
        let outer = Node::list(ListKind::Plain, vec![num(2), inner], 0);
        assert_eq!(outer.depth(), 2);
    }

    #[test]
    fn display_renders_canonical_source() {
        let params = Node::list(ListKind::Map, vec![sym(":window"), num(14)], 0);
        let call = Node::list(
            ListKind::Plain,
            vec![sym("rsi"), string("SPY"), params],
            0,
        );
        assert_eq!(call.to_string(), "(rsi \"SPY\" {:window 14})");
    }

    #[test]
    fn display_escapes_strings() {
        assert_eq!(string("a\"b\\c\n").to_string(), r#""a\"b\\c\n""#);
    }

    #[test]
    fn display_keeps_decimal_scale() {
        let n = Node::atom(Atom::Number(Decimal::new(314, 2)), 0);
        assert_eq!(n.to_string(), "3.14");
        let n = Node::atom(Atom::Number(Decimal::new(-5, 1)), 0);
        assert_eq!(n.to_string(), "-0.5");
    }
}
