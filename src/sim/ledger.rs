//! Capital ledger: realized yield tracking and trade sizing.

use serde::{Deserialize, Serialize};

/// Cumulative realized yield, before and after fees, over one simulation
/// run. Gross and net are tracked separately and must not be collapsed
/// into a single number; both are reported.
///
/// The ledger has exactly one writer (the state machine) and is mutated
/// only via [`apply_trade`](CapitalLedger::apply_trade), once per Exit
/// event, in timestamp order. It persists for the whole run and is never
/// reset mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalLedger {
    initial_capital: f64,
    cumulative_yield_before_fees: f64,
    cumulative_yield_after_fees: f64,
}

impl CapitalLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cumulative_yield_before_fees: 0.0,
            cumulative_yield_after_fees: 0.0,
        }
    }

    /// Capital available to size the next trade.
    pub fn running_capital(&self) -> f64 {
        self.initial_capital + self.cumulative_yield_after_fees
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cumulative_before_fees(&self) -> f64 {
        self.cumulative_yield_before_fees
    }

    pub fn cumulative_after_fees(&self) -> f64 {
        self.cumulative_yield_after_fees
    }

    /// Fold one closed trade into the ledger.
    pub fn apply_trade(&mut self, pnl_before_fees: f64, pnl_after_fees: f64) {
        self.cumulative_yield_before_fees += pnl_before_fees;
        self.cumulative_yield_after_fees += pnl_after_fees;
    }
}
