//! Editor-facing validation: lex + parse, with failures turned into diagnostics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ast::Program;
use crate::error::SyntaxError;
use crate::lexer::tokenize;
use crate::parser::{opens_block, parse, parse_block};
use crate::token::{Token, TokenKind};

/// Commands the interpreter handles itself, never looked up in a registry.
pub const BUILTIN_COMMANDS: &[&str] = &["wait"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A positioned validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(err: SyntaxError) -> Self {
        Diagnostic::error(err.line, err.column, err.message)
    }
}

/// Parse `code`, reporting a syntax failure as a diagnostic list.
pub fn compile(code: &str) -> Result<Program, Vec<Diagnostic>> {
    parse(&tokenize(code)).map_err(|err| vec![Diagnostic::from(err)])
}

/// Errors only; a well-formed script yields an empty list.
pub fn validate(code: &str) -> Vec<Diagnostic> {
    match compile(code) {
        Ok(_) => Vec::new(),
        Err(diagnostics) => diagnostics,
    }
}

/// [`validate`], plus warnings for calls to commands outside `known` and for
/// top-level tokens the parser skips.
pub fn validate_with_commands<'a>(
    code: &str,
    known: impl IntoIterator<Item = &'a str>,
) -> Vec<Diagnostic> {
    let mut diagnostics = validate(code);
    if !diagnostics.is_empty() {
        return diagnostics;
    }

    let known: HashSet<&str> = known.into_iter().chain(BUILTIN_COMMANDS.iter().copied()).collect();
    let tokens = tokenize(code);
    let mut stray: Option<&Token> = None;
    let mut index = 0;
    while index < tokens.len() {
        if !opens_block(&tokens[index]) {
            stray.get_or_insert(&tokens[index]);
            index += 1;
            continue;
        }
        if let Some(first) = stray.take() {
            diagnostics.push(ignored_tokens(first));
        }
        // The code already parsed cleanly, so every block does.
        let Ok((_, next)) = parse_block(&tokens, index) else { break };
        for pair in tokens[index..next].windows(2) {
            let (name, after) = (&pair[0], &pair[1]);
            if name.kind == TokenKind::Identifier
                && after.is_symbol("(")
                && !known.contains(name.value.as_str())
            {
                diagnostics.push(Diagnostic::warning(
                    name.line,
                    name.column,
                    format!("Unknown command '{}'", name.value),
                ));
            }
        }
        index = next;
    }
    if let Some(first) = stray {
        diagnostics.push(ignored_tokens(first));
    }
    diagnostics
}

fn ignored_tokens(first: &Token) -> Diagnostic {
    Diagnostic::warning(
        first.line,
        first.column,
        format!("Ignored top-level tokens starting at '{}'", first.value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_script_has_no_diagnostics() {
        let code = "when donation > 100 then playSound('epic') end\n\
                    on follower do showAlert('Hi','msg',5) end\n\
                    every 1 hour do nextScene() end";
        assert!(validate(code).is_empty());
    }

    #[test]
    fn missing_end_is_reported_as_error() {
        let diagnostics = validate("on follower do speak('hi')");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert!(compile("on follower do speak('hi')").is_err());
    }

    #[test]
    fn unknown_commands_are_warnings() {
        let diagnostics = validate_with_commands(
            "on follower do\n  speak('hi')\n  wait(1)\n  dance()\nend",
            ["speak"],
        );
        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.line, 4);
        assert_eq!(d.message, "Unknown command 'dance'");
    }

    #[test]
    fn syntax_errors_suppress_command_warnings() {
        let diagnostics = validate_with_commands("on follower do dance(", []);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn calls_outside_blocks_are_reported_as_ignored_tokens() {
        let diagnostics = validate_with_commands("dance()
on raid do speak('hi') end
sing", ["speak"]);
        let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Ignored top-level tokens starting at 'dance'",
                "Ignored top-level tokens starting at 'sing'",
            ]
        );
        assert!(diagnostics.iter().all(|d| d.severity == Severity::Warning));
        assert_eq!(diagnostics[1].line, 3);
    }
}
