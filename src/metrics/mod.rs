//! Summary metrics for a finished simulation run.
//!
//! Annualized yield, trade performance, and fee impact, computed from the
//! trade ledger and the annotated sequence.

use crate::sim::{ExitClause, SimulationResult, StatsAggregator};
use serde::{Deserialize, Serialize};

/// Aggregate performance figures for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    // Capital
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Cumulative funding income before fees
    pub total_yield_before_fees: f64,
    /// Cumulative realized yield after fees
    pub total_yield_after_fees: f64,
    /// Entry plus exit fees across all recorded events
    pub total_fees: f64,

    // Returns
    /// Net return on initial capital, percent
    pub total_return_pct: f64,
    /// Compounded annualized yield, percent
    pub apy_pct: f64,
    /// Simple annualized rate, percent
    pub apr_pct: f64,

    // Trade performance
    pub total_trades: u64,
    pub win_rate_pct: f64,
    /// Gross wins over gross losses; infinite when no trade lost
    pub profit_factor: f64,
    pub avg_trade_duration_hours: f64,
    pub max_trade_duration_hours: f64,

    // Activity
    pub time_utilization_pct: f64,
    pub duration_days: f64,
    pub stop_loss_exits: u64,
    pub premium_collapse_exits: u64,
    pub funding_below_threshold_exits: u64,
    pub position_open_at_end: bool,
}

impl RunMetrics {
    /// Compute metrics from a run and its aggregated stats.
    pub fn calculate(result: &SimulationResult, stats: &StatsAggregator) -> Self {
        if result.annotated.is_empty() {
            return Self::empty(result.ledger.initial_capital());
        }

        let initial_capital = result.ledger.initial_capital();
        let final_capital = result.ledger.running_capital();
        let total_yield_before_fees = result.ledger.cumulative_before_fees();
        let total_yield_after_fees = result.ledger.cumulative_after_fees();
        let total_fees: f64 = result.recorder.events().iter().map(|e| e.fees).sum();

        let first = result.annotated.first().map(|r| r.timestamp);
        let last = result.annotated.last().map(|r| r.timestamp);
        let duration_days = match (first, last) {
            (Some(first), Some(last)) => (last - first).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };

        let total_return = total_yield_after_fees / initial_capital;
        let total_return_pct = total_return * 100.0;
        let (apy_pct, apr_pct) = if duration_days > 0.0 {
            let apy = (1.0 + total_return).powf(365.0 / duration_days) - 1.0;
            let apr = total_return * (365.0 / duration_days);
            (apy * 100.0, apr * 100.0)
        } else {
            (0.0, 0.0)
        };

        let trades = result.recorder.trades();
        let total_trades = trades.len() as u64;

        let wins: f64 = trades
            .iter()
            .map(|(_, exit)| exit.pnl_after_fees)
            .filter(|p| *p > 0.0)
            .sum();
        let losses: f64 = trades
            .iter()
            .map(|(_, exit)| exit.pnl_after_fees)
            .filter(|p| *p <= 0.0)
            .sum();
        let winning = trades
            .iter()
            .filter(|(_, exit)| exit.pnl_after_fees > 0.0)
            .count() as u64;

        let win_rate_pct = if total_trades > 0 {
            winning as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };
        let profit_factor = if losses.abs() > 0.0 {
            wins / losses.abs()
        } else if wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let durations_hours: Vec<f64> = trades
            .iter()
            .map(|(entry, exit)| (exit.time - entry.time).num_seconds() as f64 / 3600.0)
            .collect();
        let avg_trade_duration_hours = if durations_hours.is_empty() {
            0.0
        } else {
            durations_hours.iter().sum::<f64>() / durations_hours.len() as f64
        };
        let max_trade_duration_hours = durations_hours.iter().copied().fold(0.0, f64::max);

        Self {
            initial_capital,
            final_capital,
            total_yield_before_fees,
            total_yield_after_fees,
            total_fees,
            total_return_pct,
            apy_pct,
            apr_pct,
            total_trades,
            win_rate_pct,
            profit_factor,
            avg_trade_duration_hours,
            max_trade_duration_hours,
            time_utilization_pct: stats.time_utilization(),
            duration_days,
            stop_loss_exits: stats.exits_by(ExitClause::StopLoss),
            premium_collapse_exits: stats.exits_by(ExitClause::PremiumCollapse),
            funding_below_threshold_exits: stats.exits_by(ExitClause::FundingBelowThreshold),
            position_open_at_end: result.open_at_end.is_some(),
        }
    }

    /// Metrics for a run with no observations.
    pub fn empty(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            final_capital: initial_capital,
            total_yield_before_fees: 0.0,
            total_yield_after_fees: 0.0,
            total_fees: 0.0,
            total_return_pct: 0.0,
            apy_pct: 0.0,
            apr_pct: 0.0,
            total_trades: 0,
            win_rate_pct: 0.0,
            profit_factor: 0.0,
            avg_trade_duration_hours: 0.0,
            max_trade_duration_hours: 0.0,
            time_utilization_pct: 0.0,
            duration_days: 0.0,
            stop_loss_exits: 0,
            premium_collapse_exits: 0,
            funding_below_threshold_exits: 0,
            position_open_at_end: false,
        }
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        let total_exits =
            self.stop_loss_exits + self.premium_collapse_exits + self.funding_below_threshold_exits;
        let pct = |count: u64| {
            if total_exits > 0 {
                count as f64 / total_exits as f64 * 100.0
            } else {
                0.0
            }
        };

        let mut s = format!(
            r#"═══════════════════════════════════════════════
BACKTEST RESULTS ({:.1} days)
═══════════════════════════════════════════════
CAPITAL
  Initial:           ${:.2}
  Final:             ${:.2}
  Yield (gross):     ${:.2}
  Yield (net):       ${:.2}
  Fees Paid:         ${:.2}

RETURNS
  Total Return:      {:.2}%
  APY:               {:.2}%
  APR:               {:.2}%

TRADES
  Closed Trades:     {}
  Win Rate:          {:.1}%
  Avg Duration:      {:.1}h
  Max Duration:      {:.1}h
  Time In Position:  {:.2}%

EXIT REASONS
  Stop-loss:                 {} ({:.1}%)
  Perp price < Spot price:   {} ({:.1}%)
  Funding rate < Threshold:  {} ({:.1}%)
═══════════════════════════════════════════════"#,
            self.duration_days,
            self.initial_capital,
            self.final_capital,
            self.total_yield_before_fees,
            self.total_yield_after_fees,
            self.total_fees,
            self.total_return_pct,
            self.apy_pct,
            self.apr_pct,
            self.total_trades,
            self.win_rate_pct,
            self.avg_trade_duration_hours,
            self.max_trade_duration_hours,
            self.time_utilization_pct,
            self.stop_loss_exits,
            pct(self.stop_loss_exits),
            self.premium_collapse_exits,
            pct(self.premium_collapse_exits),
            self.funding_below_threshold_exits,
            pct(self.funding_below_threshold_exits),
        );

        if self.position_open_at_end {
            s.push_str("\nNOTE: position still open at end of data (no exit recorded)");
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::feed::MarketObservation;
    use crate::sim::Simulator;
    use chrono::{TimeZone, Utc};

    fn obs(hour: u32, spot: f64, perp: f64, funding_rate: f64) -> MarketObservation {
        MarketObservation {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 24, hour, 0, 0).unwrap(),
            spot,
            perp,
            funding_rate,
        }
    }

    fn run(observations: &[MarketObservation]) -> (SimulationResult, StatsAggregator) {
        let config = StrategyConfig {
            initial_capital: 100_000.0,
            funding_threshold: 0.0,
            exit_price_multiplier: 1.0,
            ..StrategyConfig::default()
        };
        let result = Simulator::new(config).unwrap().run(observations);
        let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);
        (result, stats)
    }

    #[test]
    fn test_empty_run_metrics() {
        let (result, stats) = run(&[]);
        let metrics = RunMetrics::calculate(&result, &stats);

        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.final_capital, 100_000.0);
        assert_eq!(metrics.apy_pct, 0.0);
        assert_eq!(metrics.time_utilization_pct, 0.0);
    }

    #[test]
    fn test_fees_sum_entry_and_exit() {
        let observations = vec![
            obs(0, 10.0, 10.5, 0.001),
            obs(1, 10.0, 9.9, 0.001), // premium collapse
        ];
        let (result, stats) = run(&observations);
        let metrics = RunMetrics::calculate(&result, &stats);

        let allocated = 0.89 * 100_000.0;
        let expected = allocated * (0.0007 + 0.00045) + allocated * (0.0004 + 0.00015);
        assert!((metrics.total_fees - expected).abs() < 1e-9);
    }

    #[test]
    fn test_annualization_from_elapsed_time() {
        // One day of hourly data, one profitable trade
        let observations: Vec<_> = (0..24)
            .map(|i| {
                if i == 23 {
                    obs(i, 10.0, 9.9, 0.001)
                } else {
                    obs(i, 10.0, 10.5, 0.001)
                }
            })
            .collect();
        let (result, stats) = run(&observations);
        let metrics = RunMetrics::calculate(&result, &stats);

        assert!((metrics.duration_days - 23.0 / 24.0).abs() < 1e-9);
        let r = metrics.total_yield_after_fees / 100_000.0;
        let expected_apy = ((1.0 + r).powf(365.0 / metrics.duration_days) - 1.0) * 100.0;
        assert!((metrics.apy_pct - expected_apy).abs() < 1e-9);
    }

    #[test]
    fn test_win_rate_and_exit_breakdown() {
        let observations = vec![
            obs(0, 10.0, 10.5, 0.01), // profitable trade
            obs(1, 10.0, 9.9, 0.01),
            obs(2, 10.0, 10.5, 0.000001), // fee-dominated losing trade
            obs(3, 10.0, 9.9, 0.000001),
        ];
        let (result, stats) = run(&observations);
        let metrics = RunMetrics::calculate(&result, &stats);

        assert_eq!(metrics.total_trades, 2);
        assert!((metrics.win_rate_pct - 50.0).abs() < 1e-9);
        assert_eq!(metrics.premium_collapse_exits, 2);
        assert_eq!(metrics.stop_loss_exits, 0);
    }

    #[test]
    fn test_summary_renders() {
        let observations = vec![obs(0, 10.0, 10.5, 0.001), obs(1, 10.0, 9.9, 0.001)];
        let (result, stats) = run(&observations);
        let metrics = RunMetrics::calculate(&result, &stats);

        let summary = metrics.summary();
        assert!(summary.contains("BACKTEST RESULTS"));
        assert!(summary.contains("Closed Trades:     1"));
        assert!(!summary.contains("still open"));
    }

    #[test]
    fn test_summary_notes_open_position() {
        let observations = vec![obs(0, 10.0, 10.5, 0.001), obs(1, 10.0, 10.4, 0.001)];
        let (result, stats) = run(&observations);
        let metrics = RunMetrics::calculate(&result, &stats);

        assert!(metrics.position_open_at_end);
        assert!(metrics.summary().contains("still open at end of data"));
    }
}
