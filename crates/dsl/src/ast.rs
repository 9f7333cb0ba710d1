//! Parsed program structure.
//!
//! A [`Program`] is transient: it is rebuilt from script text for every
//! validate/execute call and never persisted on its own. [`Trigger`] is the
//! exception: workflows store it directly, so it carries the JSON shape used by
//! workflow import/export.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// A positional action argument. The language only has string and number literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Number(f64),
    String(String),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Numeric view; numeric strings count too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&ArgValue> for Value {
    /// Whole numbers become JSON integers so handlers see `5`, not `5.0`.
    fn from(arg: &ArgValue) -> Self {
        match arg {
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::from(*n as i64)
            }
            ArgValue::Number(n) => Value::from(*n),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Comparison operator allowed in a `when` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "contains")]
    Contains,
}

impl Comparison {
    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        Some(match lexeme {
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "contains" => Self::Contains,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `left operator right`, at most one per trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub left: String,
    pub operator: Comparison,
    pub right: String,
}

impl Condition {
    /// Evaluate against an event context.
    ///
    /// The left operand is looked up by name, then under `"value"`. A missing
    /// operand never matches. Both sides numeric means a numeric comparison;
    /// otherwise strings are compared.
    pub fn evaluate(&self, context: &HashMap<String, String>) -> bool {
        let Some(actual) = context.get(&self.left).or_else(|| context.get("value")) else {
            return false;
        };

        if self.operator == Comparison::Contains {
            return actual.contains(self.right.as_str());
        }

        match (actual.trim().parse::<f64>(), self.right.trim().parse::<f64>()) {
            (Ok(a), Ok(b)) => compare(self.operator, &a, &b),
            _ => compare(self.operator, actual.as_str(), self.right.as_str()),
        }
    }
}

fn compare<T: PartialOrd + ?Sized>(operator: Comparison, a: &T, b: &T) -> bool {
    match operator {
        Comparison::Gt => a > b,
        Comparison::Lt => a < b,
        Comparison::Ge => a >= b,
        Comparison::Le => a <= b,
        Comparison::Eq => a == b,
        Comparison::Ne => a != b,
        Comparison::Contains => false,
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What causes a rule or workflow to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fired by the external event bus.
    Event {
        #[serde(rename = "eventName")]
        event_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },
    /// Fired by an external timer; the expression is opaque to the engine.
    Schedule {
        #[serde(rename = "scheduleExpr")]
        schedule_expr: String,
    },
    /// Started explicitly by a user.
    Manual,
}

impl Trigger {
    pub fn event(name: impl Into<String>) -> Self {
        Self::Event {
            event_name: name.into(),
            condition: None,
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { event_name, .. } => Some(event_name),
            _ => None,
        }
    }

    pub fn schedule_expr(&self) -> Option<&str> {
        match self {
            Self::Schedule { schedule_expr } => Some(schedule_expr),
            _ => None,
        }
    }

    /// True when `event` names this trigger and its condition (if any) holds.
    pub fn matches_event(&self, event: &str, context: &HashMap<String, String>) -> bool {
        match self {
            Self::Event {
                event_name,
                condition,
            } => {
                event_name == event
                    && condition.as_ref().map_or(true, |c| c.evaluate(context))
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// A named command invocation with positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub command: String,
    pub args: Vec<ArgValue>,
}

impl ActionCall {
    pub fn new(command: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// One trigger and its ordered action list. Action order is source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub trigger: Trigger,
    pub actions: Vec<ActionCall>,
}

/// Every rule block of a script, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub rules: Vec<Rule>,
}

impl Program {
    /// Distinct command names, in first-use order.
    pub fn commands(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for action in self.rules.iter().flat_map(|r| &r.actions) {
            if !seen.contains(&action.command.as_str()) {
                seen.push(action.command.as_str());
            }
        }
        seen
    }
}
