//! CSV indicator snapshot adapter.
//!
//! Expected layout, header required:
//!
//! ```text
//! symbol,indicator,period,value
//! SPY,rsi,14,72.5
//! SPY,current-price,0,451.20
//! ```

use crate::adapters::memory_adapter::InMemoryIndicators;
use crate::domain::error::{EngineError, IndicatorError};
use crate::domain::indicator::Indicator;
use crate::ports::indicator_port::IndicatorPort;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const COLUMNS: [&str; 4] = ["symbol", "indicator", "period", "value"];

#[derive(Debug, Clone)]
pub struct CsvSnapshotAdapter {
    snapshot: InMemoryIndicators,
}

fn snapshot_error(row: u64, reason: impl std::fmt::Display) -> EngineError {
    EngineError::Snapshot {
        reason: format!("row {}: {}", row, reason),
    }
}

impl CsvSnapshotAdapter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EngineError::Snapshot {
            reason: format!("failed to open {}: {}", path.display(), e),
        })?;
        let adapter = Self::from_reader(file)?;
        debug!(file = %path.display(), entries = adapter.len(), "indicator snapshot loaded");
        Ok(adapter)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, EngineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = rdr.headers().map_err(|e| EngineError::Snapshot {
            reason: format!("CSV header error: {}", e),
        })?;
        let found: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
        if found != COLUMNS {
            return Err(EngineError::Snapshot {
                reason: format!(
                    "expected header '{}', found '{}'",
                    COLUMNS.join(","),
                    found.join(",")
                ),
            });
        }

        let mut snapshot = InMemoryIndicators::new();
        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::Snapshot {
                reason: format!("CSV parse error: {}", e),
            })?;
            let row = record.position().map_or(0, |p| p.line());

            let symbol = record.get(0).unwrap_or_default();
            if symbol.is_empty() {
                return Err(snapshot_error(row, "missing symbol"));
            }

            let name = record.get(1).unwrap_or_default();
            let indicator = Indicator::from_name(name)
                .ok_or_else(|| snapshot_error(row, format!("unknown indicator '{}'", name)))?;

            let period = parse_period(indicator, record.get(2).unwrap_or_default())
                .map_err(|reason| snapshot_error(row, reason))?;

            let raw = record.get(3).unwrap_or_default();
            let value = Decimal::from_str_exact(raw)
                .map_err(|e| snapshot_error(row, format!("invalid value '{}': {}", raw, e)))?;

            if snapshot.insert(symbol, indicator, period, value).is_some() {
                return Err(snapshot_error(
                    row,
                    format!("duplicate entry for {} {}({})", symbol, indicator, period),
                ));
            }
        }

        Ok(Self { snapshot })
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

fn parse_period(indicator: Indicator, raw: &str) -> Result<u32, String> {
    if !indicator.takes_period() {
        return match raw {
            "" | "0" => Ok(0),
            other => Err(format!("{} takes no period, found '{}'", indicator, other)),
        };
    }
    match raw.parse::<u32>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(format!("invalid period '{}' for {}", raw, indicator)),
    }
}

impl IndicatorPort for CsvSnapshotAdapter {
    fn get(
        &self,
        symbol: &str,
        indicator: Indicator,
        period: u32,
    ) -> Result<Decimal, IndicatorError> {
        self.snapshot.get(symbol, indicator, period)
    }
}
