//! Configuration validation.
//!
//! Validates the `[engine]` and `[logging]` sections before any strategy runs.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use std::collections::HashSet;

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyListError {
    #[error("empty entry in strategy list")]
    EmptyToken,

    #[error("duplicate strategy: {0}")]
    Duplicate(String),
}

/// Split a comma separated list of strategy files, keeping order.
pub fn parse_strategy_list(input: &str) -> Result<Vec<String>, StrategyListError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(StrategyListError::EmptyToken);
        }
        if !seen.insert(trimmed) {
            return Err(StrategyListError::Duplicate(trimmed.to_string()));
        }
        entries.push(trimmed.to_string());
    }

    Ok(entries)
}

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_snapshot(config)?;
    validate_strategies(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validate_snapshot(config: &dyn ConfigPort) -> Result<(), EngineError> {
    match config.get_string("engine", "snapshot") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(EngineError::ConfigMissing {
            section: "engine".to_string(),
            key: "snapshot".to_string(),
        }),
    }
}

fn validate_strategies(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let raw = match config.get_string("engine", "strategies") {
        Some(s) if !s.trim().is_empty() => s,
        _ => {
            return Err(EngineError::ConfigMissing {
                section: "engine".to_string(),
                key: "strategies".to_string(),
            });
        }
    };
    parse_strategy_list(&raw).map_err(|e| EngineError::ConfigInvalid {
        section: "engine".to_string(),
        key: "strategies".to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

fn validate_log_level(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let Some(level) = config.get_string("logging", "level") else {
        return Ok(());
    };
    let level = level.trim().to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(EngineError::ConfigInvalid {
            section: "logging".to_string(),
            key: "level".to_string(),
            reason: format!("level must be one of {}", LOG_LEVELS.join(", ")),
        });
    }
    Ok(())
}
