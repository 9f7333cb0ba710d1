//! Recursive-descent parser — token stream to [`Program`].
//!
//! ```text
//! Program    := RuleBlock*
//! RuleBlock  := WhenBlock | OnBlock | EveryBlock
//! WhenBlock  := "when" EVENT [ COMPARISON VALUE ] "then" ActionList "end"
//! OnBlock    := "on" EVENT "do" ActionList "end"
//! EveryBlock := "every" NUMBER UNIT "do" ActionList "end"
//! ActionList := ( IDENTIFIER "(" ArgList? ")" )*
//! ArgList    := Arg ( "," Arg )*
//! Arg        := STRING | NUMBER
//! ```
//!
//! At top level any token that does not open a block is ignored. Inside a
//! block the first structural violation aborts the parse with a [`SyntaxError`].

use tracing::debug;

use crate::ast::{ActionCall, ArgValue, Comparison, Condition, Program, Rule, Trigger};
use crate::error::SyntaxError;
use crate::token::{Token, TokenKind};

/// Parse a token stream into a [`Program`].
///
/// # Errors
/// Returns the first [`SyntaxError`] found inside a rule block.
pub fn parse(tokens: &[Token]) -> Result<Program, SyntaxError> {
    let mut rules = Vec::new();
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        if opens_block(token) {
            let (rule, next) = parse_block(tokens, index)?;
            rules.push(rule);
            index = next;
        } else {
            debug!(line = token.line, "ignoring stray top-level token '{}'", token.value);
            index += 1;
        }
    }

    Ok(Program { rules })
}

/// Whether `token` starts a rule block; everything else at top level is skipped.
pub(crate) fn opens_block(token: &Token) -> bool {
    token.is_keyword("when") || token.is_keyword("on") || token.is_keyword("every")
}

/// Parse the block opening at `start`; returns the rule and the index just
/// past its closing `end`.
pub fn parse_block(tokens: &[Token], start: usize) -> Result<(Rule, usize), SyntaxError> {
    let mut cursor = Cursor { tokens, pos: start };
    let rule = match cursor.advance() {
        Some(t) if t.is_keyword("when") => cursor.when_block()?,
        Some(t) if t.is_keyword("on") => cursor.on_block()?,
        Some(t) if t.is_keyword("every") => cursor.every_block()?,
        Some(t) => {
            return Err(SyntaxError::new(
                t.line,
                t.column,
                format!("Expected 'when', 'on' or 'every', found '{}'", t.value),
            ))
        }
        None => return Err(cursor.error_at_end("Expected a rule block")),
    };
    Ok((rule, cursor.pos))
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn error_at_end(&self, message: impl Into<String>) -> SyntaxError {
        match self.tokens.last() {
            Some(last) => SyntaxError::new(last.line, last.column, message),
            None => SyntaxError::new(1, 1, message),
        }
    }

    fn error_at(&self, token: Option<&Token>, message: impl Into<String>) -> SyntaxError {
        match token {
            Some(t) => SyntaxError::new(t.line, t.column, message),
            None => self.error_at_end(message),
        }
    }

    fn expect_keyword(&mut self, word: &str, context: &str) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(t) if t.is_keyword(word) => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.error_at(other, format!("Expected '{word}' {context}"))),
        }
    }

    fn expect_symbol(&mut self, symbol: &str, context: &str) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(t) if t.is_symbol(symbol) => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.error_at(other, format!("Expected '{symbol}' {context}"))),
        }
    }

    fn event_name(&mut self, after: &str) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                self.pos += 1;
                Ok(t.value.clone())
            }
            other => Err(self.error_at(other, format!("Expected event name after '{after}'"))),
        }
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    fn when_block(&mut self) -> Result<Rule, SyntaxError> {
        let event_name = self.event_name("when")?;

        let condition = match self.peek().and_then(comparison_of) {
            Some(operator) => {
                self.pos += 1;
                let right = match self.peek() {
                    Some(t)
                        if matches!(
                            t.kind,
                            TokenKind::Number | TokenKind::String | TokenKind::Identifier
                        ) =>
                    {
                        self.pos += 1;
                        t.value.clone()
                    }
                    other => {
                        return Err(self.error_at(
                            other,
                            format!("Expected value after '{operator}'"),
                        ))
                    }
                };
                Some(Condition {
                    left: event_name.clone(),
                    operator,
                    right,
                })
            }
            None => None,
        };

        self.expect_keyword("then", "after 'when' trigger")?;
        let actions = self.action_list("when")?;

        Ok(Rule {
            trigger: Trigger::Event {
                event_name,
                condition,
            },
            actions,
        })
    }

    fn on_block(&mut self) -> Result<Rule, SyntaxError> {
        let event_name = self.event_name("on")?;
        self.expect_keyword("do", "after 'on' event name")?;
        let actions = self.action_list("on")?;

        Ok(Rule {
            trigger: Trigger::Event {
                event_name,
                condition: None,
            },
            actions,
        })
    }

    fn every_block(&mut self) -> Result<Rule, SyntaxError> {
        let amount = match self.peek() {
            Some(t) if t.kind == TokenKind::Number => {
                self.pos += 1;
                t.value.clone()
            }
            other => return Err(self.error_at(other, "Expected number after 'every'")),
        };

        let unit = match self.peek() {
            Some(t) if matches!(t.kind, TokenKind::Keyword | TokenKind::Identifier) => {
                self.pos += 1;
                t.value.clone()
            }
            other => {
                return Err(self.error_at(other, format!("Expected time unit after 'every {amount}'")))
            }
        };

        self.expect_keyword("do", "after schedule")?;
        let actions = self.action_list("every")?;

        Ok(Rule {
            trigger: Trigger::Schedule {
                schedule_expr: format!("{amount} {unit}"),
            },
            actions,
        })
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Actions up to and including the block's closing `end`.
    fn action_list(&mut self, block: &str) -> Result<Vec<ActionCall>, SyntaxError> {
        let mut actions = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error_at_end(format!(
                        "Expected 'end' to close '{block}' block"
                    )))
                }
                Some(t) if t.is_keyword("end") => {
                    self.pos += 1;
                    return Ok(actions);
                }
                Some(t) if t.kind == TokenKind::Identifier => {
                    self.pos += 1;
                    actions.push(self.action(t)?);
                }
                Some(t) => {
                    return Err(self.error_at(
                        Some(t),
                        format!("Expected command or 'end', found '{}'", t.value),
                    ))
                }
            }
        }
    }

    fn action(&mut self, name: &Token) -> Result<ActionCall, SyntaxError> {
        let context = format!("after '{}'", name.value);
        self.expect_symbol("(", &context)?;

        let mut args = Vec::new();
        if matches!(self.peek(), Some(t) if t.is_symbol(")")) {
            self.pos += 1;
            return Ok(ActionCall::new(name.value.clone(), args));
        }

        loop {
            args.push(self.argument()?);
            match self.peek() {
                Some(t) if t.is_symbol(",") => self.pos += 1,
                Some(t) if t.is_symbol(")") => {
                    self.pos += 1;
                    break;
                }
                other => {
                    return Err(self.error_at(other, "Expected ',' or ')' in argument list"))
                }
            }
        }

        Ok(ActionCall::new(name.value.clone(), args))
    }

    fn argument(&mut self) -> Result<ArgValue, SyntaxError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::String => {
                self.pos += 1;
                Ok(ArgValue::String(t.value.clone()))
            }
            Some(t) if t.kind == TokenKind::Number => {
                self.pos += 1;
                t.value
                    .parse::<f64>()
                    .map(ArgValue::Number)
                    .map_err(|_| SyntaxError::new(t.line, t.column, format!("Invalid number '{}'", t.value)))
            }
            other => Err(self.error_at(other, "Expected string or number argument")),
        }
    }
}

fn comparison_of(token: &Token) -> Option<Comparison> {
    match token.kind {
        TokenKind::Operator => Comparison::from_lexeme(&token.value),
        TokenKind::Keyword if token.value == "contains" => Some(Comparison::Contains),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(code: &str) -> Result<Program, SyntaxError> {
        parse(&tokenize(code))
    }

    #[test]
    fn when_block_with_comparison() {
        let program = parse_str("when donation > 100 then playSound('epic') end").unwrap();
        assert_eq!(program.rules.len(), 1);
        let rule = &program.rules[0];
        assert_eq!(
            rule.trigger,
            Trigger::Event {
                event_name: "donation".into(),
                condition: Some(Condition {
                    left: "donation".into(),
                    operator: Comparison::Gt,
                    right: "100".into(),
                }),
            }
        );
        assert_eq!(rule.actions, vec![ActionCall::new("playSound", vec!["epic".into()])]);
    }

    #[test]
    fn on_block_keeps_argument_order_and_types() {
        let program = parse_str("on follower do showAlert('Hi','msg',5) end").unwrap();
        let rule = &program.rules[0];
        assert_eq!(rule.trigger, Trigger::event("follower"));
        assert_eq!(
            rule.actions[0].args,
            vec![
                ArgValue::String("Hi".into()),
                ArgValue::String("msg".into()),
                ArgValue::Number(5.0),
            ]
        );
    }

    #[test]
    fn every_block_builds_schedule_expression() {
        let program = parse_str("every 1 hour do nextScene() end").unwrap();
        assert_eq!(
            program.rules[0].trigger,
            Trigger::Schedule {
                schedule_expr: "1 hour".into()
            }
        );
        assert_eq!(program.rules[0].actions, vec![ActionCall::new("nextScene", vec![])]);
    }

    #[test]
    fn contains_condition() {
        let program = parse_str("when chat contains '!hype' then speak('hype!') end").unwrap();
        match &program.rules[0].trigger {
            Trigger::Event {
                condition: Some(c), ..
            } => {
                assert_eq!(c.operator, Comparison::Contains);
                assert_eq!(c.right, "!hype");
            }
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn multiple_blocks_keep_source_order() {
        let code = "
            # greet followers
            on follower do
                speak('Welcome {{username}}')
                wait(2)
                showAlert('New follower', '{{username}}', 5)
            end

            every 30 minutes do
                speak('Remember to hydrate')
            end
        ";
        let program = parse_str(code).unwrap();
        assert_eq!(program.rules.len(), 2);
        let commands: Vec<_> = program.rules[0]
            .actions
            .iter()
            .map(|a| a.command.as_str())
            .collect();
        assert_eq!(commands, vec!["speak", "wait", "showAlert"]);
        assert_eq!(program.rules[1].trigger.schedule_expr(), Some("30 minutes"));
    }

    #[test]
    fn stray_top_level_tokens_are_ignored() {
        let program = parse_str("hello 42 'x' on raid do end (").unwrap();
        assert_eq!(program.rules.len(), 1);
        assert!(program.rules[0].actions.is_empty());
    }

    #[test]
    fn missing_end_is_an_error() {
        let err = parse_str("on follower do speak('hi')").unwrap_err();
        assert!(err.message.contains("'end'"), "{}", err.message);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn missing_event_name_after_on() {
        let err = parse_str("on do speak('hi') end").unwrap_err();
        assert_eq!(err.message, "Expected event name after 'on'");
        assert_eq!((err.line, err.column), (1, 6));
    }

    #[test]
    fn missing_then_is_an_error() {
        let err = parse_str("when donation > 5 speak('x') end").unwrap_err();
        assert!(err.message.contains("'then'"));
    }

    #[test]
    fn identifier_arguments_are_rejected() {
        let err = parse_str("on follower do speak(username) end").unwrap_err();
        assert_eq!(err.message, "Expected string or number argument");
    }

    #[test]
    fn unclosed_argument_list_is_an_error() {
        let err = parse_str("on follower do speak('a' 'b') end").unwrap_err();
        assert!(err.message.contains("')'"));
    }

    #[test]
    fn parse_block_returns_next_index() {
        let tokens = tokenize("on a do end on b do end");
        let (rule, next) = parse_block(&tokens, 0).unwrap();
        assert_eq!(rule.trigger.event_name(), Some("a"));
        assert_eq!(next, 4);
        let (rule, next) = parse_block(&tokens, next).unwrap();
        assert_eq!(rule.trigger.event_name(), Some("b"));
        assert_eq!(next, tokens.len());
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        assert_eq!(parse_str("").unwrap(), Program::default());
    }
}
