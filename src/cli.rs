//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvSnapshotAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::allocation::TargetAllocation;
use crate::domain::config_validation::{parse_strategy_list, validate_run_config};
use crate::domain::engine::{FileOutcome, evaluate_batch, read_source};
use crate::domain::error::EngineError;
use crate::domain::parser::parse_source;
use crate::logging::{DEFAULT_LEVEL, init_logging};
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "stratlang", about = "Evaluate allocation strategies into target weights")]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a strategy file and print its canonical form
    Validate { file: PathBuf },
    /// Evaluate strategy files against an indicator snapshot
    Eval {
        #[arg(short, long)]
        snapshot: PathBuf,
        #[arg(long)]
        trace: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Evaluate the strategies listed in a config file
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        trace: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub snapshot: PathBuf,
    pub strategies: Vec<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    ExitCode::from(execute(cli))
}

/// Dispatch a parsed command line and return the process exit status.
pub fn execute(cli: Cli) -> u8 {
    match cli.command {
        Command::Validate { file } => {
            init_logging(cli.log_level.as_deref().unwrap_or(DEFAULT_LEVEL), false);
            run_validate(&file)
        }
        Command::Eval {
            snapshot,
            trace,
            files,
        } => {
            init_logging(cli.log_level.as_deref().unwrap_or(DEFAULT_LEVEL), false);
            run_files(&snapshot, &files, trace)
        }
        Command::Run { config, trace } => run_config(&config, cli.log_level.as_deref(), trace),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EngineError> {
    FileConfigAdapter::from_file(path).map_err(|e| EngineError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Read `[engine]` and `[logging]`. Relative paths are resolved against
/// `base_dir`, normally the directory holding the config file.
pub fn build_run_config(
    adapter: &dyn ConfigPort,
    base_dir: &Path,
) -> Result<RunConfig, EngineError> {
    validate_run_config(adapter)?;

    let snapshot = adapter
        .get_string("engine", "snapshot")
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "engine".into(),
            key: "snapshot".into(),
        })?;
    let strategies = adapter
        .get_string("engine", "strategies")
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "engine".into(),
            key: "strategies".into(),
        })?;
    let strategies =
        parse_strategy_list(&strategies).map_err(|e| EngineError::ConfigInvalid {
            section: "engine".into(),
            key: "strategies".into(),
            reason: e.to_string(),
        })?;

    Ok(RunConfig {
        snapshot: base_dir.join(snapshot.trim()),
        strategies: strategies.iter().map(|s| base_dir.join(s)).collect(),
        log_level: adapter
            .get_string("logging", "level")
            .map(|l| l.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        log_json: adapter.get_bool("logging", "json", false),
    })
}

/// `SYMBOL weight` lines, symbols in ascending order.
pub fn format_allocation(allocation: &TargetAllocation) -> String {
    allocation
        .weights()
        .iter()
        .map(|(symbol, weight)| format!("{} {}", symbol, weight.normalize()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn report_outcome(outcome: &FileOutcome, show_trace: bool) {
    println!("# {}", outcome.path.display());
    match &outcome.result {
        Ok((allocation, trace)) => {
            if allocation.is_empty() {
                eprintln!("{}: empty allocation", outcome.path.display());
            } else {
                println!("{}", format_allocation(allocation));
            }
            if show_trace && !trace.is_empty() {
                eprintln!("trace for {}:", outcome.path.display());
                for step in trace.steps() {
                    eprintln!("  {}", step);
                }
            }
        }
        Err(e) => eprintln!("error: {}: {}", outcome.path.display(), e),
    }
}

/// Evaluate every file against one snapshot. The exit status is that of the
/// first failing file, or 0.
pub fn run_files(snapshot_path: &Path, files: &[PathBuf], show_trace: bool) -> u8 {
    let snapshot = match CsvSnapshotAdapter::from_path(snapshot_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_status();
        }
    };
    eprintln!(
        "Loaded {} indicator values from {}",
        snapshot.len(),
        snapshot_path.display()
    );

    let outcomes = evaluate_batch(files, &snapshot);
    let mut status = 0;
    for outcome in &outcomes {
        report_outcome(outcome, show_trace);
        if let Err(e) = &outcome.result {
            if status == 0 {
                status = e.exit_status();
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        eprintln!("{} of {} strategies failed", failed, outcomes.len());
    }
    status
}

fn run_config(config_path: &Path, level_override: Option<&str>, show_trace: bool) -> u8 {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_status();
        }
    };
    let base_dir = config_path.parent().unwrap_or(Path::new("."));
    let config = match build_run_config(&adapter, base_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_status();
        }
    };

    init_logging(level_override.unwrap_or(&config.log_level), config.log_json);
    eprintln!(
        "Running {} strategies from {}",
        config.strategies.len(),
        config_path.display()
    );
    run_files(&config.snapshot, &config.strategies, show_trace)
}

fn run_validate(path: &Path) -> u8 {
    eprintln!("Validating strategy: {}", path.display());
    let source = match read_source(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            return e.exit_status();
        }
    };

    match parse_source(&source) {
        Ok(ast) => {
            println!("{}", ast);
            eprintln!("Strategy is valid.");
            0
        }
        Err(EngineError::Parse(e)) => {
            eprintln!("error: {}", e.display_with_context(&source));
            EngineError::from(e).exit_status()
        }
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_status()
        }
    }
}
