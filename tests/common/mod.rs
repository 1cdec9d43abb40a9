#![allow(dead_code)]

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use stratlang::domain::error::IndicatorError;
use stratlang::domain::indicator::Indicator;
use stratlang::ports::indicator_port::IndicatorPort;

pub type Key = (String, Indicator, u32);

/// Indicator port that records every request and can be told to fail.
pub struct StubIndicatorPort {
    pub values: HashMap<Key, Decimal>,
    pub failures: HashMap<Key, String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Key>>,
}

impl StubIndicatorPort {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            failures: HashMap::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_value(mut self, symbol: &str, indicator: Indicator, period: u32, value: &str) -> Self {
        self.values
            .insert((symbol.to_string(), indicator, period), dec(value));
        self
    }

    pub fn with_failure(mut self, symbol: &str, indicator: Indicator, period: u32, reason: &str) -> Self {
        self.failures
            .insert((symbol.to_string(), indicator, period), reason.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Key> {
        self.requests.lock().unwrap().clone()
    }
}

impl IndicatorPort for StubIndicatorPort {
    fn get(
        &self,
        symbol: &str,
        indicator: Indicator,
        period: u32,
    ) -> Result<Decimal, IndicatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (symbol.to_string(), indicator, period);
        self.requests.lock().unwrap().push(key.clone());

        let failure = |reason: String| IndicatorError {
            symbol: symbol.to_string(),
            indicator,
            period,
            reason,
        };
        if let Some(reason) = self.failures.get(&key) {
            return Err(failure(reason.clone()));
        }
        self.values
            .get(&key)
            .copied()
            .ok_or_else(|| failure("no value in stub".to_string()))
    }
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub const RSI_SWITCH: &str = r#"
; rotate into short treasuries when SPY is overbought
(defsymphony "RSI Switch" {:rebalance-frequency :daily}
  (if (> (rsi "SPY" 14) 70)
      (weight-equal [(asset "SHY")])
      (weight-equal [(asset "SPY")])))
"#;
