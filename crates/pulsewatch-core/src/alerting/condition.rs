//! Trigger condition evaluation
//!
//! Observed values come out of a fetched JSON document and are compared
//! against an operand string configured on the trigger. Evaluation never
//! fails: anything it cannot compare evaluates to `false`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value extracted from a monitored payload
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedValue {
    /// JSON integer
    Int(i64),
    /// Any other JSON number
    Float(f64),
    /// JSON string
    String(String),
}

impl ObservedValue {
    /// Convert a JSON value. Booleans, null, arrays and objects have no
    /// comparable representation.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// The five supported comparisons, observed value on the left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// observed > operand
    Greater,
    /// observed >= operand
    GreaterOrEqual,
    /// observed == operand
    Equal,
    /// observed <= operand
    LessOrEqual,
    /// observed < operand
    Less,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::Equal => ordering == Ordering::Equal,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Less => ordering == Ordering::Less,
        }
    }

    /// Parse an operator keyword. Symbols depend on the alias table.
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "gt" => Some(Self::Greater),
            "gte" => Some(Self::GreaterOrEqual),
            "eq" | "==" => Some(Self::Equal),
            "lte" => Some(Self::LessOrEqual),
            "lt" => Some(Self::Less),
            _ => None,
        }
    }

    /// Canonical keyword
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greater => "gt",
            Self::GreaterOrEqual => "gte",
            Self::Equal => "eq",
            Self::LessOrEqual => "lte",
            Self::Less => "lt",
        }
    }
}

/// Which symbolic aliases map to which comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorAliases {
    /// `gt|<`, `gte|<=`, `eq|==`, `lte|>=`, `lt|>`.
    ///
    /// The symbols read backwards relative to the keywords. Stored trigger
    /// definitions rely on this pairing.
    #[default]
    Legacy,
    /// `gt|>`, `gte|>=`, `eq|==`, `lte|<=`, `lt|<`
    Conventional,
}

/// Operator lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatorTable {
    aliases: OperatorAliases,
}

impl OperatorTable {
    /// Table with the historical symbol pairing
    pub const fn legacy() -> Self {
        Self {
            aliases: OperatorAliases::Legacy,
        }
    }

    /// Table where symbols match their keywords
    pub const fn conventional() -> Self {
        Self {
            aliases: OperatorAliases::Conventional,
        }
    }

    /// Table for a configured alias set
    pub const fn new(aliases: OperatorAliases) -> Self {
        Self { aliases }
    }

    /// Resolve an operator keyword or symbol
    pub fn resolve(&self, op: &str) -> Option<Comparison> {
        if let Some(comparison) = Comparison::parse(op) {
            return Some(comparison);
        }

        match (self.aliases, op) {
            (OperatorAliases::Legacy, "<") | (OperatorAliases::Conventional, ">") => {
                Some(Comparison::Greater)
            }
            (OperatorAliases::Legacy, "<=") | (OperatorAliases::Conventional, ">=") => {
                Some(Comparison::GreaterOrEqual)
            }
            (OperatorAliases::Legacy, ">=") | (OperatorAliases::Conventional, "<=") => {
                Some(Comparison::LessOrEqual)
            }
            (OperatorAliases::Legacy, ">") | (OperatorAliases::Conventional, "<") => {
                Some(Comparison::Less)
            }
            _ => None,
        }
    }

    /// Evaluate `observed <op> operand`
    pub fn eval(&self, observed: Option<&ObservedValue>, operand: &str, op: &str) -> bool {
        let (Some(observed), Some(comparison)) = (observed, self.resolve(op)) else {
            return false;
        };

        let ordering = match observed {
            ObservedValue::Int(v) => Some(v.cmp(&parse_operand(operand))),
            ObservedValue::Float(v) => v.partial_cmp(&(parse_operand(operand) as f64)),
            ObservedValue::String(s) => Some(s.as_str().cmp(operand)),
        };

        ordering.is_some_and(|o| comparison.holds(o))
    }
}

/// Evaluate with the default (legacy) operator table
pub fn eval(observed: Option<&ObservedValue>, operand: &str, op: &str) -> bool {
    OperatorTable::legacy().eval(observed, operand, op)
}

/// Numeric operands are integers; anything unparseable counts as zero.
fn parse_operand(operand: &str) -> i64 {
    operand.trim().parse().unwrap_or(0)
}
