//! Domain error types.
//!
//! Lexical and syntax failures share [`ParseError`] (tagged by
//! [`ParseErrorKind`]), evaluation failures are [`EvalError`], and everything
//! surfaces to callers through [`EngineError`].

use crate::domain::indicator::Indicator;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Lexical,
    Syntax,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Lexical => write!(f, "lexical error"),
            ParseErrorKind::Syntax => write!(f, "syntax error"),
        }
    }
}

/// A tokenizer or parser failure with the byte offset it occurred at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at position {position}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn lexical(message: impl Into<String>, position: usize) -> Self {
        Self {
            kind: ParseErrorKind::Lexical,
            message: message.into(),
            position,
        }
    }

    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self {
            kind: ParseErrorKind::Syntax,
            message: message.into(),
            position,
        }
    }

    /// 1-based line and column of the error position within `input`.
    pub fn line_col(&self, input: &str) -> (usize, usize) {
        let end = self.position.min(input.len());
        let before = input.get(..end).unwrap_or(input);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }

    /// Format the error with the offending source line and a caret under the
    /// error position.
    pub fn display_with_context(&self, input: &str) -> String {
        let (line, column) = self.line_col(input);
        let source_line = input.lines().nth(line - 1).unwrap_or("");
        let caret = " ".repeat(column - 1) + "^";
        format!(
            "line {line}, column {column}:\n{source_line}\n{caret}\n{err}",
            err = self
        )
    }
}

/// Failure reported by an indicator port for a single lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{indicator}({period}) unavailable for {symbol}: {reason}")]
pub struct IndicatorError {
    pub symbol: String,
    pub indicator: Indicator,
    pub period: u32,
    pub reason: String,
}

/// An evaluation failure, tagged with the rendered node that raised it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("evaluation error at position {position}: {message} (in {context})")]
pub struct EvalError {
    pub message: String,
    pub context: String,
    pub position: usize,
    #[source]
    pub source: Option<IndicatorError>,
}

/// Top-level error type for stratlang.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("source is {size} bytes, exceeding the {limit} byte limit")]
    ResourceLimit { size: u64, limit: u64 },

    #[error(transparent)]
    Evaluation(#[from] EvalError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("indicator snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Snapshot { .. } => 3,
            EngineError::Parse(_) | EngineError::ResourceLimit { .. } => 4,
            EngineError::Evaluation(_) => 5,
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
