//! Target allocation produced by evaluating a strategy.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;

/// Symbol → weight map plus free-form metadata.
///
/// Weights are never negative. Their sum is not forced to 1: a strategy whose
/// branch yields nothing legitimately produces an empty allocation, and the
/// downstream rebalancer aggregates several files' results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TargetAllocation {
    weights: BTreeMap<String, Decimal>,
    pub metadata: BTreeMap<String, String>,
}

impl TargetAllocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single symbol at full weight.
    pub fn single(symbol: impl Into<String>) -> Self {
        let mut allocation = Self::new();
        allocation.weights.insert(symbol.into(), Decimal::ONE);
        allocation
    }

    pub fn weights(&self) -> &BTreeMap<String, Decimal> {
        &self.weights
    }

    pub fn weight(&self, symbol: &str) -> Option<Decimal> {
        self.weights.get(symbol).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    /// Add `weight` to `symbol`. Zero and negative weights are ignored, so a
    /// symbol is only ever present with a positive weight.
    pub fn add(&mut self, symbol: &str, weight: Decimal) {
        if weight <= Decimal::ZERO {
            return;
        }
        *self
            .weights
            .entry(symbol.to_string())
            .or_insert(Decimal::ZERO) += weight;
    }

    /// Rescale so the weights sum to 1. Empty or zero-total allocations are
    /// returned unchanged.
    pub fn normalized(&self) -> TargetAllocation {
        let total = self.total();
        if total.is_zero() {
            return self.clone();
        }
        TargetAllocation {
            weights: self
                .weights
                .iter()
                .map(|(symbol, w)| (symbol.clone(), *w / total))
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Add every weight of `other` multiplied by `factor`.
    pub fn merge_scaled(&mut self, other: &TargetAllocation, factor: Decimal) {
        for (symbol, weight) in &other.weights {
            self.add(symbol, *weight * factor);
        }
    }
}

impl fmt::Display for TargetAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (symbol, weight)) in self.weights.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", symbol, weight.normalize())?;
        }
        f.write_str("}")
    }
}
