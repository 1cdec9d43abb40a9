//! Strategy evaluation engine.
//!
//! Walks the AST depth-first, left to right, against an injected
//! [`IndicatorPort`].
//!
//! # Evaluation Semantics
//!
//! - Numbers and strings evaluate to themselves, `:kw` to a keyword,
//!   `true`/`false` to booleans; any other bare symbol is undefined
//! - A plain list headed by a symbol is an operator call (see [`forms`])
//! - Any other plain list evaluates its elements into a list value
//! - A map evaluates its keys and values in order
//! - The root must produce an allocation
//!
//! Identical indicator requests within one evaluation hit the port once.
//!
//! Evaluation runs on its own thread with an [`EVAL_STACK_BYTES`] stack, so a
//! strategy nested to the parser's [`MAX_DEPTH`] evaluates the same way no
//! matter how small the caller's stack is. The interpreter also enforces
//! [`MAX_DEPTH`] itself, for trees that did not come from the parser.

use crate::domain::allocation::TargetAllocation;
use crate::domain::ast::{Atom, ListKind, Node, NodeKind};
use crate::domain::error::EvalError;
use crate::domain::forms;
use crate::domain::indicator::Indicator;
use crate::domain::parser::MAX_DEPTH;
use crate::domain::trace::DecisionTrace;
use crate::domain::value::{IndicatorRequest, Value};
use crate::ports::indicator_port::IndicatorPort;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write};
use std::{panic, thread};
use tracing::trace;

const CONTEXT_LIMIT: usize = 80;

/// Stack reserved for the evaluation thread.
pub const EVAL_STACK_BYTES: usize = 32 * 1024 * 1024;

/// State for a single evaluation call: the decision trace, strategy metadata
/// and the indicator cache. Never reuse one across strategies.
#[derive(Debug, Default)]
pub struct EvalContext {
    trace: DecisionTrace,
    metadata: BTreeMap<String, String>,
    cache: HashMap<(String, Indicator, u32), Decimal>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> &DecisionTrace {
        &self.trace
    }

    pub fn into_trace(self) -> DecisionTrace {
        self.trace
    }

    pub(crate) fn record(&mut self, step: impl Into<String>) {
        self.trace.record(step);
    }

    pub(crate) fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }
}

/// Collects at most `remaining` characters, then refuses further writes.
struct BoundedWriter {
    out: String,
    remaining: usize,
    truncated: bool,
}

impl fmt::Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.remaining == 0 {
                self.truncated = true;
                return Err(fmt::Error);
            }
            self.out.push(ch);
            self.remaining -= 1;
        }
        Ok(())
    }
}

/// Source rendering of `node`, cut at [`CONTEXT_LIMIT`] characters without
/// formatting the rest of the subtree.
pub(crate) fn render_context(node: &Node) -> String {
    let mut writer = BoundedWriter {
        out: String::new(),
        remaining: CONTEXT_LIMIT,
        truncated: false,
    };
    if write!(writer, "{}", node).is_err() && writer.truncated {
        writer.out.push_str("...");
    }
    writer.out
}

pub(crate) fn error_at(node: &Node, message: impl Into<String>) -> EvalError {
    EvalError {
        message: message.into(),
        context: render_context(node),
        position: node.position,
        source: None,
    }
}

fn type_error(node: &Node, expected: &str, found: &Value) -> EvalError {
    error_at(
        node,
        format!("expected {}, got {}", expected, found.type_name()),
    )
}

pub(crate) fn expect_number(node: &Node, value: Value) -> Result<Decimal, EvalError> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(type_error(node, "number", &other)),
    }
}

pub(crate) fn expect_bool(node: &Node, value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(type_error(node, "boolean", &other)),
    }
}

pub(crate) fn expect_string(node: &Node, value: Value) -> Result<String, EvalError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(node, "string", &other)),
    }
}

/// A list of allocations, or a single allocation treated as a one-element list.
pub(crate) fn expect_allocations(
    node: &Node,
    value: Value,
) -> Result<Vec<TargetAllocation>, EvalError> {
    match value {
        Value::Allocation(a) => Ok(vec![a]),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Allocation(a) => Ok(a),
                other => Err(error_at(
                    node,
                    format!("expected a list of allocations, found {}", other.type_name()),
                )),
            })
            .collect(),
        other => Err(type_error(node, "list of allocations", &other)),
    }
}

fn positive_integer(node: &Node, n: Decimal, what: &str) -> Result<u32, EvalError> {
    if n > Decimal::ZERO && n.fract().is_zero() {
        if let Some(v) = n.to_u32() {
            return Ok(v);
        }
    }
    Err(error_at(
        node,
        format!("{} must be a positive integer, got {}", what, n.normalize()),
    ))
}

pub(crate) fn expect_count(node: &Node, value: Value) -> Result<usize, EvalError> {
    let n = expect_number(node, value)?;
    positive_integer(node, n, "count").map(|v| v as usize)
}

/// A look-back window given as a number or as `{:window n}`.
pub(crate) fn expect_period(node: &Node, value: Value) -> Result<u32, EvalError> {
    match value {
        Value::Number(n) => positive_integer(node, n, "period"),
        Value::Map(pairs) => {
            let mut window = None;
            for (key, value) in pairs {
                match key {
                    Value::Keyword(k) if k == "window" => window = Some(value),
                    other => {
                        return Err(error_at(
                            node,
                            format!("unknown indicator parameter {}", other),
                        ));
                    }
                }
            }
            match window {
                Some(Value::Number(n)) => positive_integer(node, n, "period"),
                Some(other) => Err(type_error(node, "numeric :window", &other)),
                None => Err(error_at(node, "missing :window parameter")),
            }
        }
        other => Err(type_error(node, "period or {:window n}", &other)),
    }
}

pub(crate) struct Interpreter<'e> {
    port: &'e dyn IndicatorPort,
    ctx: &'e mut EvalContext,
    depth: usize,
}

impl<'e> Interpreter<'e> {
    fn new(port: &'e dyn IndicatorPort, ctx: &'e mut EvalContext) -> Self {
        Self {
            port,
            ctx,
            depth: 0,
        }
    }

    pub(crate) fn context(&mut self) -> &mut EvalContext {
        &mut *self.ctx
    }

    pub(crate) fn eval(&mut self, node: &Node) -> Result<Value, EvalError> {
        match &node.kind {
            NodeKind::Atom(Atom::Number(n)) => Ok(Value::Number(*n)),
            NodeKind::Atom(Atom::Str(s)) => Ok(Value::Str(s.clone())),
            NodeKind::Atom(Atom::Symbol(name)) => eval_symbol(node, name),
            NodeKind::List { kind, children } => {
                if self.depth >= MAX_DEPTH {
                    return Err(error_at(
                        node,
                        format!("maximum nesting depth {} exceeded", MAX_DEPTH),
                    ));
                }
                self.depth += 1;
                let result = self.eval_list(node, *kind, children);
                self.depth -= 1;
                result
            }
        }
    }

    fn eval_list(
        &mut self,
        node: &Node,
        kind: ListKind,
        children: &[Node],
    ) -> Result<Value, EvalError> {
        match kind {
            ListKind::Map => {
                let mut pairs = Vec::with_capacity(children.len() / 2);
                for pair in children.chunks(2) {
                    let key = self.eval(&pair[0])?;
                    let value = match pair.get(1) {
                        Some(v) => self.eval(v)?,
                        None => return Err(error_at(node, "map key without a value")),
                    };
                    pairs.push((key, value));
                }
                Ok(Value::Map(pairs))
            }
            ListKind::Plain => match node.head_symbol() {
                Some(name) => self.call(node, name, &children[1..]),
                None => {
                    let mut items = Vec::with_capacity(children.len());
                    for child in children {
                        items.push(self.eval(child)?);
                    }
                    Ok(Value::List(items))
                }
            },
        }
    }

    fn call(&mut self, node: &Node, name: &str, args: &[Node]) -> Result<Value, EvalError> {
        let entry = forms::lookup(name)
            .ok_or_else(|| error_at(node, format!("unknown operator '{}'", name)))?;
        if !entry.arity.accepts(args.len()) {
            return Err(error_at(
                node,
                format!("'{}' expects {}, got {}", name, entry.arity, args.len()),
            ));
        }
        entry.form.apply(self, node, args)
    }

    pub(crate) fn fetch(
        &mut self,
        node: &Node,
        symbol: &str,
        request: IndicatorRequest,
    ) -> Result<Decimal, EvalError> {
        let key = (symbol.to_string(), request.indicator, request.period);
        if let Some(value) = self.ctx.cache.get(&key) {
            return Ok(*value);
        }

        let value = self
            .port
            .get(symbol, request.indicator, request.period)
            .map_err(|e| EvalError {
                message: format!(
                    "indicator {} unavailable for '{}': {}",
                    request, symbol, e.reason
                ),
                context: render_context(node),
                position: node.position,
                source: Some(e),
            })?;
        trace!(symbol, indicator = %request.indicator, period = request.period, %value, "indicator fetched");

        self.ctx.cache.insert(key, value);
        Ok(value)
    }
}

fn eval_symbol(node: &Node, name: &str) -> Result<Value, EvalError> {
    if let Some(keyword) = name.strip_prefix(':') {
        return Ok(Value::Keyword(keyword.to_string()));
    }
    match name {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ if forms::lookup(name).is_some() => Err(error_at(
            node,
            format!("undefined symbol '{}' (operators must be called inside a list)", name),
        )),
        _ => Err(error_at(node, format!("undefined symbol '{}'", name))),
    }
}

/// Evaluate a parsed strategy into its target allocation.
///
/// The context receives the decision trace; pass a fresh one per call.
/// The walk itself happens on a scoped thread with [`EVAL_STACK_BYTES`] of
/// stack; a panic there resumes on the calling thread.
pub fn evaluate(
    ast: &Node,
    port: &dyn IndicatorPort,
    ctx: &mut EvalContext,
) -> Result<TargetAllocation, EvalError> {
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("stratlang-eval".to_string())
            .stack_size(EVAL_STACK_BYTES)
            .spawn_scoped(scope, move || evaluate_in_place(ast, port, ctx))
            .map_err(|e| error_at(ast, format!("cannot start evaluation thread: {}", e)))?;
        handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    })
}

fn evaluate_in_place(
    ast: &Node,
    port: &dyn IndicatorPort,
    ctx: &mut EvalContext,
) -> Result<TargetAllocation, EvalError> {
    let value = Interpreter::new(port, &mut *ctx).eval(ast)?;

    match value {
        Value::Allocation(mut allocation) => {
            for (key, value) in &ctx.metadata {
                allocation
                    .metadata
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            Ok(allocation)
        }
        other => Err(error_at(
            ast,
            format!(
                "strategy must evaluate to an allocation, got {}",
                other.type_name()
            ),
        )),
    }
}
