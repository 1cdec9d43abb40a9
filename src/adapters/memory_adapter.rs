//! In-memory indicator snapshot.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::Indicator;
use crate::ports::indicator_port::IndicatorPort;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Pre-computed indicator values keyed by `(symbol, indicator, period)`.
///
/// Read-only once built, so one snapshot can be shared by threads evaluating
/// different strategies.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndicators {
    values: HashMap<(String, Indicator, u32), Decimal>,
}

impl InMemoryIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(
        mut self,
        symbol: &str,
        indicator: Indicator,
        period: u32,
        value: Decimal,
    ) -> Self {
        self.insert(symbol, indicator, period, value);
        self
    }

    /// Returns the previous value for the same key, if any.
    pub fn insert(
        &mut self,
        symbol: &str,
        indicator: Indicator,
        period: u32,
        value: Decimal,
    ) -> Option<Decimal> {
        self.values
            .insert((symbol.to_string(), indicator, period), value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IndicatorPort for InMemoryIndicators {
    fn get(
        &self,
        symbol: &str,
        indicator: Indicator,
        period: u32,
    ) -> Result<Decimal, IndicatorError> {
        self.values
            .get(&(symbol.to_string(), indicator, period))
            .copied()
            .ok_or_else(|| IndicatorError {
                symbol: symbol.to_string(),
                indicator,
                period,
                reason: "not present in snapshot".to_string(),
            })
    }
}
