//! Engine façade: source text or file in, target allocation out.
//!
//! Each call builds its own [`EvalContext`], so nothing leaks between
//! evaluations and repeated runs over the same snapshot agree.

use crate::domain::allocation::TargetAllocation;
use crate::domain::error::EngineError;
use crate::domain::eval::{EvalContext, evaluate};
use crate::domain::parser::{check_source_size, parse_source};
use crate::domain::trace::DecisionTrace;
use crate::ports::indicator_port::IndicatorPort;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Tokenize, parse and evaluate one strategy source.
pub fn evaluate_strategy(
    source: &str,
    port: &dyn IndicatorPort,
) -> Result<(TargetAllocation, DecisionTrace), EngineError> {
    let ast = parse_source(source)?;
    debug!(depth = ast.depth(), "strategy parsed");

    let mut ctx = EvalContext::new();
    let allocation = evaluate(&ast, port, &mut ctx)?;
    debug!(symbols = allocation.len(), "strategy evaluated");
    Ok((allocation, ctx.into_trace()))
}

/// Read a strategy file, refusing oversized files before reading them.
pub fn read_source(path: &Path) -> Result<String, EngineError> {
    let size = fs::metadata(path)?.len();
    check_source_size(size)?;
    Ok(fs::read_to_string(path)?)
}

pub fn evaluate_strategy_file(
    path: &Path,
    port: &dyn IndicatorPort,
) -> Result<(TargetAllocation, DecisionTrace), EngineError> {
    debug!(file = %path.display(), "reading strategy");
    let source = read_source(path)?;
    let (mut allocation, trace) = evaluate_strategy(&source, port)?;
    allocation
        .metadata
        .insert("source".to_string(), path.display().to_string());
    Ok((allocation, trace))
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<(TargetAllocation, DecisionTrace), EngineError>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Evaluate independent strategy files in order. A failing file is logged
/// and recorded; the remaining files still run.
pub fn evaluate_batch(paths: &[PathBuf], port: &dyn IndicatorPort) -> Vec<FileOutcome> {
    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        let result = evaluate_strategy_file(path, port);
        match &result {
            Ok((allocation, _)) => {
                info!(file = %path.display(), allocation = %allocation, "strategy evaluated");
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "strategy failed");
            }
        }
        outcomes.push(FileOutcome {
            path: path.clone(),
            result,
        });
    }
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(total = outcomes.len(), failed, "batch complete");
    outcomes
}
