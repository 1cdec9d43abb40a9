//! Runtime values produced while evaluating a strategy.

use crate::domain::allocation::TargetAllocation;
use crate::domain::indicator::Indicator;
use rust_decimal::Decimal;
use std::fmt;

/// An indicator with its window but no symbol yet; `filter` applies it to
/// each candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorRequest {
    pub indicator: Indicator,
    pub period: u32,
}

impl fmt::Display for IndicatorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.indicator, self.period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Top(usize),
    Bottom(usize),
}

impl Selector {
    pub fn count(self) -> usize {
        match self {
            Selector::Top(n) | Selector::Bottom(n) => n,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Top(n) => write!(f, "select-top {}", n),
            Selector::Bottom(n) => write!(f, "select-bottom {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Decimal),
    Bool(bool),
    Str(String),
    /// Keyword name without the leading `:`.
    Keyword(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Allocation(TargetAllocation),
    Metric(IndicatorRequest),
    Selector(Selector),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Allocation(_) => "allocation",
            Value::Metric(_) => "metric",
            Value::Selector(_) => "selector",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Keyword(k) => write!(f, ":{}", k),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Allocation(a) => write!(f, "{}", a),
            Value::Metric(m) => write!(f, "{}", m),
            Value::Selector(s) => write!(f, "{}", s),
        }
    }
}
