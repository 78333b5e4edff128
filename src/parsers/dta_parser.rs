//! Lenient stack parser turning manifest tokens into a node tree.

use serde::Serialize;
use tracing::warn;

use super::tokenizer::{Token, TokenKind, decode_text, tokenize, unescape_string};

/// Decoded class of a leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomKind {
    Str,
    Symbol,
    Int,
    Float,
    Word,
}

/// A leaf: decoded value plus the class it was written as.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atom {
    pub kind: AtomKind,
    pub value: String,
}

impl Atom {
    /// Build an atom from a non-paren token.
    pub fn from_token(tok: &Token<'_>) -> Self {
        match tok.kind {
            TokenKind::Str => Atom {
                kind: AtomKind::Str,
                value: decode_text(&unescape_string(tok.raw)).into_owned(),
            },
            TokenKind::Symbol => Atom {
                kind: AtomKind::Symbol,
                value: strip_symbol_quotes(&tok.text()).to_string(),
            },
            _ => {
                let text = tok.text();
                let kind = if text.parse::<i64>().is_ok() {
                    AtomKind::Int
                } else if looks_numeric(&text) && text.parse::<f64>().is_ok() {
                    AtomKind::Float
                } else {
                    AtomKind::Word
                };
                Atom { kind, value: text.into_owned() }
            }
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            AtomKind::Int => self.value.parse().ok(),
            AtomKind::Float => self.value.parse::<f64>().ok().map(|f| f as i64),
            _ => self.value.trim().parse().ok(),
        }
    }
}

// Rejects "inf", "nan" and friends that f64 would otherwise accept
fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

/// Strip a leading `'` and its trailing partner.
pub fn strip_symbol_quotes(text: &str) -> &str {
    match text.strip_prefix('\'') {
        Some(rest) => rest.strip_suffix('\'').unwrap_or(rest),
        None => text,
    }
}

/// Parsed manifest node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Atom(Atom),
    List(Vec<Node>),
}

impl Node {
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Node::Atom(a) => Some(a),
            Node::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            Node::Atom(_) => None,
        }
    }

    /// First child atom of a list, used as the entry or field name.
    pub fn head(&self) -> Option<&Atom> {
        self.as_list()?.first()?.as_atom()
    }
}

/// Parse a token stream into top-level nodes.
pub fn parse_tokens(tokens: &[Token<'_>]) -> Vec<Node> {
    let mut top = Vec::new();
    let mut stack: Vec<(usize, Vec<Node>)> = Vec::new();

    for tok in tokens {
        match tok.kind {
            TokenKind::Open => stack.push((tok.start, Vec::new())),
            TokenKind::Close => match stack.pop() {
                Some((_, items)) => push_node(&mut stack, &mut top, Node::List(items)),
                None => warn!(offset = tok.start, "ignoring unmatched ')'"),
            },
            _ => push_node(&mut stack, &mut top, Node::Atom(Atom::from_token(tok))),
        }
    }

    // Flush unclosed frames innermost first so nesting is kept
    while let Some((offset, items)) = stack.pop() {
        warn!(offset, "unclosed '(' at end of input");
        push_node(&mut stack, &mut top, Node::List(items));
    }

    top
}

fn push_node(stack: &mut [(usize, Vec<Node>)], top: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some((_, items)) => items.push(node),
        None => top.push(node),
    }
}

/// Tokenize and parse raw manifest bytes.
pub fn parse(src: &[u8]) -> Vec<Node> {
    parse_tokens(&tokenize(src))
}
