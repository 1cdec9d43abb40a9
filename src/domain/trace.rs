//! Human-readable record of the decisions taken during one evaluation.
//!
//! Advisory only: nothing in the evaluator reads the trace back.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecisionTrace {
    steps: Vec<String>,
}

impl DecisionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for DecisionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(step)?;
        }
        Ok(())
    }
}
