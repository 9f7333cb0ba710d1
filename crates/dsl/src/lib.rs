//! `dsl` crate — the automation scripting language.
//!
//! Text goes through three stages:
//! 1. [`lexer::tokenize`] turns source into a flat [`Token`] stream (never fails).
//! 2. [`parser::parse`] builds a [`Program`] of ordered [`Rule`]s, or returns a
//!    [`SyntaxError`] carrying the offending line/column.
//! 3. [`validator::validate`] wraps both and reports [`Diagnostic`]s for editors.
//!
//! Nothing in here executes anything; the interpreter lives in the `engine` crate.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod validator;

pub use ast::{ActionCall, ArgValue, Comparison, Condition, Program, Rule, Trigger};
pub use error::SyntaxError;
pub use lexer::tokenize;
pub use parser::parse;
pub use token::{Token, TokenKind};
pub use validator::{compile, validate, validate_with_commands, Diagnostic, Severity, BUILTIN_COMMANDS};

/// Lex and parse `code` in one step.
pub fn parse_program(code: &str) -> Result<Program, SyntaxError> {
    parse(&tokenize(code))
}
