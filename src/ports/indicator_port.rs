//! Indicator data port trait.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::Indicator;
use rust_decimal::Decimal;

/// Source of indicator values for the evaluator.
///
/// Implementations must fail when a value is unavailable; the evaluator never
/// substitutes a default. Evaluation reads the port from a worker thread, and
/// adapters shared between threads only need to be safe for concurrent reads.
pub trait IndicatorPort: Sync {
    fn get(&self, symbol: &str, indicator: Indicator, period: u32)
        -> Result<Decimal, IndicatorError>;
}
