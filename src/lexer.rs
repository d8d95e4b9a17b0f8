use std::fmt::Display;
use std::rc::Rc;

/// Category of a token, decided by its first character only
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    Number,
    Identifier,
    Operator,
}

impl TokenKind {
    fn classify(first: char) -> TokenKind {
        if first.is_ascii_digit() {
            TokenKind::Number
        } else if first.is_ascii_alphabetic() {
            TokenKind::Identifier
        } else {
            TokenKind::Operator
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Number => write!(f, "number"),
            TokenKind::Identifier => write!(f, "id"),
            TokenKind::Operator => write!(f, "operator"),
        }
    }
}

/// A maximal run of non-whitespace characters from the source
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Rc<str>,
    /// byte offset of the first character in the source text
    pub offset: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {}]", self.kind, self.text)
    }
}

/// Splits the source on whitespace and classifies every piece. There is no failure mode: empty
/// input simply yields no tokens.
pub fn lex(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (offset, character) in source.char_indices() {
        match (character.is_whitespace(), start) {
            (true, Some(begin)) => {
                tokens.push(token(source, begin, offset));
                start = None;
            }
            (false, None) => start = Some(offset),
            _ => {}
        }
    }
    if let Some(begin) = start {
        tokens.push(token(source, begin, source.len()));
    }

    tokens
}

fn token(source: &str, begin: usize, end: usize) -> Token {
    let text = &source[begin..end];
    // text is non-empty: begin always points at a non-whitespace character
    let first = text.chars().next().unwrap_or(' ');
    Token {
        kind: TokenKind::classify(first),
        text: text.into(),
        offset: begin,
    }
}
