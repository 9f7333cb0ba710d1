//! Lexer — raw script text to a token stream.
//!
//! Rules, in priority order at each character position:
//! 1. Whitespace is skipped.
//! 2. `#` or `//` starts a comment running to end of line.
//! 3. `'` or `"` opens a string; `\` escapes the next character.
//! 4. A digit starts a number: digits with at most one interior `.`.
//! 5. A character from [`SYMBOL_CHARS`] starts an operator or symbol.
//! 6. `[a-zA-Z_]` starts a word: `[a-zA-Z0-9_-]*` follows.
//!
//! Anything else is skipped. The lexer never fails.

use tracing::trace;

use crate::token::{Token, TokenKind, KEYWORDS, OPERATORS, SYMBOL_CHARS, TWO_CHAR_OPERATORS};

/// Tokenize `code`. Unrecognised characters are dropped.
pub fn tokenize(code: &str) -> Vec<Token> {
    Lexer::new(code).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(code: &str) -> Self {
        Self {
            chars: code.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' || (c == '/' && self.peek_at(1) == Some('/')) {
                self.skip_line_comment();
            } else if c == '\'' || c == '"' {
                self.lex_string(c);
            } else if c.is_ascii_digit() {
                self.lex_number();
            } else if SYMBOL_CHARS.contains(c) {
                self.lex_operator();
            } else if c.is_ascii_alphabetic() || c == '_' {
                self.lex_word();
            } else {
                trace!(line = self.line, column = self.column, "skipping unrecognised character {c:?}");
                self.bump();
            }
        }
        self.tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn emit(&mut self, kind: TokenKind, value: String) {
        self.tokens.push(Token::new(kind, value, self.line, self.column));
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn lex_string(&mut self, quote: char) {
        self.bump();
        let mut value = String::new();
        // An unterminated string runs to end of input.
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        value.push(escaped);
                    }
                }
                c if c == quote => break,
                c => value.push(c),
            }
        }
        self.emit(TokenKind::String, value);
    }

    fn lex_number(&mut self) {
        let mut value = String::new();
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
            } else if c == '.'
                && !seen_dot
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                seen_dot = true;
                value.push(c);
            } else {
                break;
            }
            self.bump();
        }
        self.emit(TokenKind::Number, value);
    }

    fn lex_operator(&mut self) {
        let first = self.peek().unwrap_or_default();
        let two: Option<String> = self.peek_at(1).map(|second| [first, second].iter().collect());

        let lexeme = match two {
            Some(pair) if TWO_CHAR_OPERATORS.contains(&pair.as_str()) => {
                self.bump();
                self.bump();
                pair
            }
            _ => {
                self.bump();
                first.to_string()
            }
        };

        let kind = if OPERATORS.contains(&lexeme.as_str()) {
            TokenKind::Operator
        } else {
            TokenKind::Symbol
        };
        self.emit(kind, lexeme);
    }

    fn lex_word(&mut self) {
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                value.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = if KEYWORDS.contains(&value.as_str()) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        self.emit(kind, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_values(code: &str) -> Vec<(TokenKind, String)> {
        tokenize(code).into_iter().map(|t| (t.kind, t.value)).collect()
    }

    #[test]
    fn classifies_keywords_identifiers_and_operators() {
        let tokens = kinds_and_values("when donation >= 100 then");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "when".to_string()),
                (TokenKind::Identifier, "donation".to_string()),
                (TokenKind::Operator, ">=".to_string()),
                (TokenKind::Number, "100".to_string()),
                (TokenKind::Keyword, "then".to_string()),
            ]
        );
    }

    #[test]
    fn parens_and_commas_are_symbols() {
        let tokens = kinds_and_values("f('a', 1)");
        assert_eq!(tokens[1], (TokenKind::Symbol, "(".to_string()));
        assert_eq!(tokens[3], (TokenKind::Symbol, ",".to_string()));
        assert_eq!(tokens[5], (TokenKind::Symbol, ")".to_string()));
    }

    #[test]
    fn strings_are_unescaped() {
        let tokens = tokenize(r#"'it\'s' "say \"hi\"""#);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].value, "it's");
        assert_eq!(tokens[1].value, "say \"hi\"");
    }

    #[test]
    fn unterminated_string_runs_to_end_of_input() {
        let tokens = tokenize("speak('oops");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::String);
        assert_eq!(last.value, "oops");
    }

    #[test]
    fn numbers_take_a_single_decimal_point() {
        let tokens = kinds_and_values("1.5 2.25.7");
        assert_eq!(tokens[0], (TokenKind::Number, "1.5".to_string()));
        assert_eq!(tokens[1], (TokenKind::Number, "2.25".to_string()));
        // the stray '.' is skipped
        assert_eq!(tokens[2], (TokenKind::Number, "7".to_string()));
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = kinds_and_values("# header\non follow // trailing\ndo end");
        let values: Vec<_> = tokens.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["on", "follow", "do", "end"]);
    }

    #[test]
    fn identifiers_may_contain_dashes() {
        let tokens = kinds_and_values("play-sound channel_2");
        assert_eq!(tokens[0], (TokenKind::Identifier, "play-sound".to_string()));
        assert_eq!(tokens[1], (TokenKind::Identifier, "channel_2".to_string()));
    }

    #[test]
    fn unknown_characters_are_dropped() {
        let tokens = kinds_and_values("on @follow$ do end");
        let values: Vec<_> = tokens.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["on", "follow", "do", "end"]);
    }

    #[test]
    fn positions_track_lines_and_token_end() {
        let tokens = tokenize("on follow\n  do end");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 3));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 10));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 5));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 9));
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t ").is_empty());
    }
}
