//! Token types emitted by the lexer.

use serde::{Deserialize, Serialize};

/// Words the lexer classifies as [`TokenKind::Keyword`].
pub const KEYWORDS: &[&str] = &[
    "when", "then", "end", "on", "do", "if", "else", "every", "minutes", "hour", "hours",
    "seconds", "and", "or", "not", "contains",
];

/// Lexemes classified as [`TokenKind::Operator`]. Anything else built from
/// [`SYMBOL_CHARS`] is a [`TokenKind::Symbol`].
pub const OPERATORS: &[&str] = &[
    "==", "!=", ">=", "<=", ">", "<", "=", "!", "+", "-", "*", "/",
];

/// Two-character operators, matched greedily before single characters.
pub const TWO_CHAR_OPERATORS: &[&str] = &["==", "!=", ">=", "<="];

/// Every character that starts an operator or symbol.
pub const SYMBOL_CHARS: &str = "(){}[]<>=!+-*/,";

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,
    Identifier,
    Operator,
    String,
    Number,
    Symbol,
}

/// A single lexeme with its source position.
///
/// `line` is 1-based. `column` is the 1-based column just past the token's
/// last character, i.e. where the lexer stood when it finished the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            column,
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.value == word
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.value == symbol
    }
}
