//! Position state held by the simulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an open position was closed, in check order. The numeric codes are
/// stable and appear in exported data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitClause {
    /// Perp price rose to the stop-loss multiple of its entry price
    StopLoss = 1,
    /// Perp price fell below the configured multiple of spot
    PremiumCollapse = 2,
    /// Funding rate dropped below the entry threshold
    FundingBelowThreshold = 3,
}

impl ExitClause {
    /// Stable numeric code used in the annotated output.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Human-readable exit reason, as recorded on Exit events.
    pub fn reason(&self) -> &'static str {
        match self {
            ExitClause::StopLoss => "Stop-loss",
            ExitClause::PremiumCollapse => "Perp price < Spot price",
            ExitClause::FundingBelowThreshold => "Funding rate < Threshold",
        }
    }

    /// All clauses, in priority order.
    pub fn all() -> [ExitClause; 3] {
        [
            ExitClause::StopLoss,
            ExitClause::PremiumCollapse,
            ExitClause::FundingBelowThreshold,
        ]
    }
}

/// A hedged position opened by the simulator.
///
/// Entry fields are captured atomically at the entry tick and never
/// recomputed mid-trade. `funding_accrued` is the one mutable field: the
/// running sum of `funding_rate * allocated_capital` over every tick in the
/// half-open interval `[entry, exit)`, maintained incrementally so closing
/// a trade costs O(1) instead of a re-scan of the trade window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub entry_time: DateTime<Utc>,
    pub entry_spot: f64,
    pub entry_perp: f64,
    pub allocated_capital: f64,
    pub entry_fee: f64,
    pub funding_accrued: f64,
}

impl OpenPosition {
    /// Add one tick's funding income to the running accumulator.
    pub fn accrue(&mut self, funding_rate: f64) {
        self.funding_accrued += funding_rate * self.allocated_capital;
    }
}

/// Simulator position state: at most one position is open at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Open(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clause_codes_are_stable() {
        assert_eq!(ExitClause::StopLoss.code(), 1);
        assert_eq!(ExitClause::PremiumCollapse.code(), 2);
        assert_eq!(ExitClause::FundingBelowThreshold.code(), 3);
    }

    #[test]
    fn test_priority_order() {
        let [first, second, third] = ExitClause::all();
        assert_eq!(first, ExitClause::StopLoss);
        assert_eq!(second, ExitClause::PremiumCollapse);
        assert_eq!(third, ExitClause::FundingBelowThreshold);
    }

    #[test]
    fn test_funding_accrual() {
        let mut position = OpenPosition {
            entry_time: Utc.with_ymd_and_hms(2025, 3, 24, 0, 0, 0).unwrap(),
            entry_spot: 10.0,
            entry_perp: 10.5,
            allocated_capital: 87_000.0,
            entry_fee: 100.05,
            funding_accrued: 0.0,
        };

        position.accrue(0.0002);
        position.accrue(0.0001);

        assert!((position.funding_accrued - 26.1).abs() < 1e-9);
    }
}
