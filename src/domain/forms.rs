//! Operator vocabulary of the strategy language.
//!
//! Every operator is a [`Form`] variant registered once in a static name
//! table together with its arity. Dispatch is a `match` over the closed enum.

use crate::domain::allocation::TargetAllocation;
use crate::domain::ast::Node;
use crate::domain::error::EvalError;
use crate::domain::eval::{
    Interpreter, error_at, expect_allocations, expect_bool, expect_count, expect_number,
    expect_period, expect_string, render_context,
};
use crate::domain::indicator::Indicator;
use crate::domain::value::{IndicatorRequest, Selector, Value};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Comparison {
    pub fn apply(self, left: Decimal, right: Decimal) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Lt => left < right,
            Comparison::Ge => left >= right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Defsymphony,
    Group,
    If,
    And,
    Or,
    Not,
    Compare(Comparison),
    Arithmetic(ArithOp),
    Asset,
    WeightEqual,
    WeightSpecified,
    Filter,
    SelectTop,
    SelectBottom,
    Indicator(Indicator),
}

/// Accepted argument counts, not counting the operator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::Between(lo, hi) => (lo..=hi).contains(&n),
            Arity::AtLeast(k) => n >= k,
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "argument" } else { "arguments" }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(k) => write!(f, "{} {}", k, plural(k)),
            Arity::Between(lo, hi) => write!(f, "{} to {} arguments", lo, hi),
            Arity::AtLeast(k) => write!(f, "at least {} {}", k, plural(k)),
        }
    }
}

#[derive(Debug)]
pub struct FormEntry {
    pub name: &'static str,
    pub form: Form,
    pub arity: Arity,
}

const fn entry(name: &'static str, form: Form, arity: Arity) -> FormEntry {
    FormEntry { name, form, arity }
}

static FORMS: &[FormEntry] = &[
    entry("defsymphony", Form::Defsymphony, Arity::Between(2, 3)),
    entry("group", Form::Group, Arity::Exact(2)),
    entry("if", Form::If, Arity::Between(2, 3)),
    entry("and", Form::And, Arity::AtLeast(1)),
    entry("or", Form::Or, Arity::AtLeast(1)),
    entry("not", Form::Not, Arity::Exact(1)),
    entry(">", Form::Compare(Comparison::Gt), Arity::Exact(2)),
    entry("<", Form::Compare(Comparison::Lt), Arity::Exact(2)),
    entry(">=", Form::Compare(Comparison::Ge), Arity::Exact(2)),
    entry("<=", Form::Compare(Comparison::Le), Arity::Exact(2)),
    entry("=", Form::Compare(Comparison::Eq), Arity::Exact(2)),
    entry("+", Form::Arithmetic(ArithOp::Add), Arity::AtLeast(1)),
    entry("-", Form::Arithmetic(ArithOp::Sub), Arity::AtLeast(1)),
    entry("*", Form::Arithmetic(ArithOp::Mul), Arity::AtLeast(1)),
    entry("/", Form::Arithmetic(ArithOp::Div), Arity::AtLeast(2)),
    entry("asset", Form::Asset, Arity::Between(1, 2)),
    entry("weight-equal", Form::WeightEqual, Arity::Exact(1)),
    entry("weight-specified", Form::WeightSpecified, Arity::AtLeast(1)),
    entry("filter", Form::Filter, Arity::Exact(3)),
    entry("select-top", Form::SelectTop, Arity::Exact(1)),
    entry("select-bottom", Form::SelectBottom, Arity::Exact(1)),
    entry("rsi", Form::Indicator(Indicator::Rsi), Arity::Between(1, 2)),
    entry(
        "moving-average-price",
        Form::Indicator(Indicator::MovingAveragePrice),
        Arity::Between(1, 2),
    ),
    entry(
        "exponential-moving-average-price",
        Form::Indicator(Indicator::ExponentialMovingAveragePrice),
        Arity::Between(1, 2),
    ),
    entry(
        "moving-average-return",
        Form::Indicator(Indicator::MovingAverageReturn),
        Arity::Between(1, 2),
    ),
    entry(
        "cumulative-return",
        Form::Indicator(Indicator::CumulativeReturn),
        Arity::Between(1, 2),
    ),
    entry(
        "stdev-return",
        Form::Indicator(Indicator::StdevReturn),
        Arity::Between(1, 2),
    ),
    entry(
        "stdev-price",
        Form::Indicator(Indicator::StdevPrice),
        Arity::Between(1, 2),
    ),
    entry(
        "max-drawdown",
        Form::Indicator(Indicator::MaxDrawdown),
        Arity::Between(1, 2),
    ),
    entry(
        "current-price",
        Form::Indicator(Indicator::CurrentPrice),
        Arity::Between(0, 1),
    ),
];

pub fn lookup(name: &str) -> Option<&'static FormEntry> {
    FORMS.iter().find(|entry| entry.name == name)
}

pub fn all() -> &'static [FormEntry] {
    FORMS
}

impl Form {
    pub(crate) fn apply(
        self,
        interp: &mut Interpreter<'_>,
        node: &Node,
        args: &[Node],
    ) -> Result<Value, EvalError> {
        match self {
            Form::Defsymphony => eval_defsymphony(interp, args),
            Form::Group => eval_group(interp, args),
            Form::If => eval_if(interp, args),
            Form::And => eval_logical(interp, args, false),
            Form::Or => eval_logical(interp, args, true),
            Form::Not => {
                let b = expect_bool(&args[0], interp.eval(&args[0])?)?;
                Ok(Value::Bool(!b))
            }
            Form::Compare(op) => {
                let left = expect_number(&args[0], interp.eval(&args[0])?)?;
                let right = expect_number(&args[1], interp.eval(&args[1])?)?;
                Ok(Value::Bool(op.apply(left, right)))
            }
            Form::Arithmetic(op) => eval_arithmetic(interp, op, node, args),
            Form::Asset => eval_asset(interp, args),
            Form::WeightEqual => {
                let children = expect_allocations(&args[0], interp.eval(&args[0])?)?;
                Ok(Value::Allocation(equal_weight(&children)))
            }
            Form::WeightSpecified => eval_weight_specified(interp, node, args),
            Form::Filter => eval_filter(interp, node, args),
            Form::SelectTop => {
                let n = expect_count(&args[0], interp.eval(&args[0])?)?;
                Ok(Value::Selector(Selector::Top(n)))
            }
            Form::SelectBottom => {
                let n = expect_count(&args[0], interp.eval(&args[0])?)?;
                Ok(Value::Selector(Selector::Bottom(n)))
            }
            Form::Indicator(indicator) => eval_indicator(interp, indicator, node, args),
        }
    }
}

fn metadata_text(node: &Node, value: Value) -> Result<String, EvalError> {
    match value {
        Value::Str(s) | Value::Keyword(s) => Ok(s),
        Value::Number(n) => Ok(n.normalize().to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(error_at(
            node,
            format!("strategy parameter must be a scalar, got {}", other.type_name()),
        )),
    }
}

fn eval_defsymphony(interp: &mut Interpreter<'_>, args: &[Node]) -> Result<Value, EvalError> {
    let name = expect_string(&args[0], interp.eval(&args[0])?)?;
    interp.context().set_metadata("name", name.clone());
    interp.context().record(format!("strategy {:?}", name));

    let body = match args {
        [_, params, body] => {
            match interp.eval(params)? {
                Value::Map(pairs) => {
                    for (key, value) in pairs {
                        let key = match key {
                            Value::Keyword(k) => k,
                            other => {
                                return Err(error_at(
                                    params,
                                    format!(
                                        "parameter keys must be keywords, got {}",
                                        other.type_name()
                                    ),
                                ));
                            }
                        };
                        let text = metadata_text(params, value)?;
                        interp.context().set_metadata(key, text);
                    }
                }
                other => {
                    return Err(error_at(
                        params,
                        format!("expected parameter map, got {}", other.type_name()),
                    ));
                }
            }
            body
        }
        [_, body] => body,
        _ => return Err(error_at(&args[0], "malformed defsymphony")),
    };
    interp.eval(body)
}

fn eval_group(interp: &mut Interpreter<'_>, args: &[Node]) -> Result<Value, EvalError> {
    let name = expect_string(&args[0], interp.eval(&args[0])?)?;
    interp.context().record(format!("group {:?}", name));
    interp.eval(&args[1])
}

fn eval_if(interp: &mut Interpreter<'_>, args: &[Node]) -> Result<Value, EvalError> {
    let condition = &args[0];
    let taken = expect_bool(condition, interp.eval(condition)?)?;
    let rendered = render_context(condition);

    if taken {
        interp.context().record(format!("if {} -> then", rendered));
        return interp.eval(&args[1]);
    }
    match args.get(2) {
        Some(otherwise) => {
            interp.context().record(format!("if {} -> else", rendered));
            interp.eval(otherwise)
        }
        None => {
            interp
                .context()
                .record(format!("if {} -> else (empty)", rendered));
            Ok(Value::Allocation(TargetAllocation::new()))
        }
    }
}

/// `and` stops at the first false, `or` at the first true.
fn eval_logical(
    interp: &mut Interpreter<'_>,
    args: &[Node],
    stop_on: bool,
) -> Result<Value, EvalError> {
    for arg in args {
        if expect_bool(arg, interp.eval(arg)?)? == stop_on {
            return Ok(Value::Bool(stop_on));
        }
    }
    Ok(Value::Bool(!stop_on))
}

fn eval_arithmetic(
    interp: &mut Interpreter<'_>,
    op: ArithOp,
    node: &Node,
    args: &[Node],
) -> Result<Value, EvalError> {
    let mut operands = Vec::with_capacity(args.len());
    for arg in args {
        operands.push(expect_number(arg, interp.eval(arg)?)?);
    }
    let Some((first, rest)) = operands.split_first() else {
        return Err(error_at(node, "arithmetic needs at least one operand"));
    };
    if rest.is_empty() && op == ArithOp::Sub {
        return Ok(Value::Number(-*first));
    }

    let mut acc = *first;
    for (value, arg) in rest.iter().zip(&args[1..]) {
        let next = match op {
            ArithOp::Add => acc.checked_add(*value),
            ArithOp::Sub => acc.checked_sub(*value),
            ArithOp::Mul => acc.checked_mul(*value),
            ArithOp::Div => {
                if value.is_zero() {
                    return Err(error_at(arg, "division by zero"));
                }
                acc.checked_div(*value)
            }
        };
        acc = next.ok_or_else(|| error_at(node, "arithmetic overflow"))?;
    }
    Ok(Value::Number(acc))
}

fn eval_asset(interp: &mut Interpreter<'_>, args: &[Node]) -> Result<Value, EvalError> {
    let ticker = expect_string(&args[0], interp.eval(&args[0])?)?;
    if ticker.trim().is_empty() {
        return Err(error_at(&args[0], "asset ticker must not be empty"));
    }
    // Optional display name, checked but unused.
    if let Some(display) = args.get(1) {
        expect_string(display, interp.eval(display)?)?;
    }
    Ok(Value::Allocation(TargetAllocation::single(ticker)))
}

/// Share weight equally among the non-empty children.
pub(crate) fn equal_weight(children: &[TargetAllocation]) -> TargetAllocation {
    let present: Vec<&TargetAllocation> = children.iter().filter(|c| !c.is_empty()).collect();
    let mut out = TargetAllocation::new();
    if present.is_empty() {
        return out;
    }
    let share = Decimal::ONE / Decimal::from(present.len());
    for child in present {
        out.merge_scaled(&child.normalized(), share);
    }
    out
}

fn child_allocation(node: &Node, value: Value) -> Result<TargetAllocation, EvalError> {
    match value {
        Value::Allocation(a) => Ok(a),
        Value::Str(ticker) => Ok(TargetAllocation::single(ticker)),
        other => Err(error_at(
            node,
            format!("expected allocation, got {}", other.type_name()),
        )),
    }
}

fn expect_weight(node: &Node, value: Value) -> Result<Decimal, EvalError> {
    let weight = expect_number(node, value)?;
    if weight.is_sign_negative() && !weight.is_zero() {
        return Err(error_at(
            node,
            format!("weight must be non-negative, got {}", weight.normalize()),
        ));
    }
    Ok(weight)
}

fn eval_weight_specified(
    interp: &mut Interpreter<'_>,
    node: &Node,
    args: &[Node],
) -> Result<Value, EvalError> {
    let mut weighted: Vec<(Decimal, TargetAllocation)> = Vec::new();

    if let [map_node] = args {
        match interp.eval(map_node)? {
            Value::Map(entries) => {
                for (child, weight) in entries {
                    let weight = expect_weight(map_node, weight)?;
                    weighted.push((weight, child_allocation(map_node, child)?));
                }
            }
            other => {
                return Err(error_at(
                    map_node,
                    format!("expected weight map, got {}", other.type_name()),
                ));
            }
        }
    } else if args.len() % 2 == 0 {
        for pair in args.chunks(2) {
            let weight = expect_weight(&pair[0], interp.eval(&pair[0])?)?;
            weighted.push((weight, child_allocation(&pair[1], interp.eval(&pair[1])?)?));
        }
    } else {
        return Err(error_at(
            node,
            format!(
                "'weight-specified' expects a weight map or weight/child pairs, got {} arguments",
                args.len()
            ),
        ));
    }

    specified_weight(node, &weighted).map(Value::Allocation)
}

/// Scale each non-empty child by its weight over the total of non-empty
/// weights. Children weighted zero are left out of the result.
fn specified_weight(
    node: &Node,
    weighted: &[(Decimal, TargetAllocation)],
) -> Result<TargetAllocation, EvalError> {
    let present: Vec<&(Decimal, TargetAllocation)> =
        weighted.iter().filter(|(_, child)| !child.is_empty()).collect();
    let mut out = TargetAllocation::new();
    if present.is_empty() {
        return Ok(out);
    }

    let total = present
        .iter()
        .try_fold(Decimal::ZERO, |acc, (w, _)| acc.checked_add(*w))
        .ok_or_else(|| error_at(node, "weights overflow"))?;
    if total.is_zero() {
        return Err(error_at(node, "weights sum to zero"));
    }

    for (weight, child) in present {
        if weight.is_zero() {
            continue;
        }
        out.merge_scaled(&child.normalized(), *weight / total);
    }
    Ok(out)
}

/// Order by value (descending for top, ascending for bottom), ties broken by
/// symbol name ascending.
pub(crate) fn rank(candidates: &mut [(Decimal, String)], selector: Selector) {
    candidates.sort_by(|a, b| {
        let primary = match selector {
            Selector::Top(_) => b.0.cmp(&a.0),
            Selector::Bottom(_) => a.0.cmp(&b.0),
        };
        primary.then_with(|| a.1.cmp(&b.1))
    });
}

fn eval_filter(
    interp: &mut Interpreter<'_>,
    node: &Node,
    args: &[Node],
) -> Result<Value, EvalError> {
    let request = match interp.eval(&args[0])? {
        Value::Metric(m) => m,
        other => {
            return Err(error_at(
                &args[0],
                format!(
                    "expected an indicator metric such as (rsi 10), got {}",
                    other.type_name()
                ),
            ));
        }
    };
    let selector = match interp.eval(&args[1])? {
        Value::Selector(s) => s,
        other => {
            return Err(error_at(
                &args[1],
                format!(
                    "expected (select-top n) or (select-bottom n), got {}",
                    other.type_name()
                ),
            ));
        }
    };
    let candidates = expect_allocations(&args[2], interp.eval(&args[2])?)?;

    let mut seen = BTreeSet::new();
    let mut ranked: Vec<(Decimal, String)> = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        if candidate.is_empty() {
            continue;
        }
        let mut symbols = candidate.symbols();
        let (Some(symbol), None) = (symbols.next(), symbols.next()) else {
            return Err(error_at(
                &args[2],
                format!(
                    "filter candidates must be single assets, got an allocation over {} symbols",
                    candidate.len()
                ),
            ));
        };
        if !seen.insert(symbol.to_string()) {
            continue;
        }
        let value = interp.fetch(node, symbol, request)?;
        ranked.push((value, symbol.to_string()));
    }

    rank(&mut ranked, selector);
    let selected: Vec<TargetAllocation> = ranked
        .iter()
        .take(selector.count())
        .map(|(_, symbol)| TargetAllocation::single(symbol.as_str()))
        .collect();

    let ranking: Vec<String> = ranked
        .iter()
        .map(|(value, symbol)| format!("{}={}", symbol, value.normalize()))
        .collect();
    let chosen: Vec<&str> = ranked
        .iter()
        .take(selector.count())
        .map(|(_, symbol)| symbol.as_str())
        .collect();
    interp.context().record(format!(
        "filter {} {}: [{}] -> [{}]",
        request,
        selector,
        ranking.join(", "),
        chosen.join(", ")
    ));

    Ok(Value::Allocation(equal_weight(&selected)))
}

fn eval_indicator(
    interp: &mut Interpreter<'_>,
    indicator: Indicator,
    node: &Node,
    args: &[Node],
) -> Result<Value, EvalError> {
    if !indicator.takes_period() {
        let request = IndicatorRequest {
            indicator,
            period: 0,
        };
        return match args.first() {
            None => Ok(Value::Metric(request)),
            Some(symbol_node) => {
                let symbol = expect_string(symbol_node, interp.eval(symbol_node)?)?;
                Ok(Value::Number(interp.fetch(node, &symbol, request)?))
            }
        };
    }

    match args {
        [period_node] => {
            let period = expect_period(period_node, interp.eval(period_node)?)?;
            Ok(Value::Metric(IndicatorRequest { indicator, period }))
        }
        [symbol_node, period_node] => {
            let symbol = expect_string(symbol_node, interp.eval(symbol_node)?)?;
            let period = expect_period(period_node, interp.eval(period_node)?)?;
            let value = interp.fetch(node, &symbol, IndicatorRequest { indicator, period })?;
            Ok(Value::Number(value))
        }
        _ => Err(error_at(
            node,
            format!("'{}' expects 1 to 2 arguments, got {}", indicator, args.len()),
        )),
    }
}
