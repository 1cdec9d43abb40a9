//! Technical indicator identities.
//!
//! The engine never computes indicators itself; an [`Indicator`] names what to
//! request from an [`IndicatorPort`](crate::ports::indicator_port::IndicatorPort)
//! together with a symbol and a look-back period.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    Rsi,
    MovingAveragePrice,
    ExponentialMovingAveragePrice,
    MovingAverageReturn,
    CumulativeReturn,
    StdevReturn,
    StdevPrice,
    MaxDrawdown,
    CurrentPrice,
}

impl Indicator {
    pub const ALL: [Indicator; 9] = [
        Indicator::Rsi,
        Indicator::MovingAveragePrice,
        Indicator::ExponentialMovingAveragePrice,
        Indicator::MovingAverageReturn,
        Indicator::CumulativeReturn,
        Indicator::StdevReturn,
        Indicator::StdevPrice,
        Indicator::MaxDrawdown,
        Indicator::CurrentPrice,
    ];

    /// Name used both as the DSL operator and in snapshot files.
    pub fn name(self) -> &'static str {
        match self {
            Indicator::Rsi => "rsi",
            Indicator::MovingAveragePrice => "moving-average-price",
            Indicator::ExponentialMovingAveragePrice => "exponential-moving-average-price",
            Indicator::MovingAverageReturn => "moving-average-return",
            Indicator::CumulativeReturn => "cumulative-return",
            Indicator::StdevReturn => "stdev-return",
            Indicator::StdevPrice => "stdev-price",
            Indicator::MaxDrawdown => "max-drawdown",
            Indicator::CurrentPrice => "current-price",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    /// `current-price` has no look-back window and is requested with period 0.
    pub fn takes_period(self) -> bool {
        !matches!(self, Indicator::CurrentPrice)
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
