//! Post-hoc statistics over a finished run.

use crate::sim::engine::AnnotatedObservation;
use crate::sim::position::ExitClause;
use crate::sim::recorder::TradeRecorder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only derived view over the annotated sequence and the trade log.
/// Computed after the stateful pass completes; never fed back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsAggregator {
    /// How many trades each exit clause closed
    pub exit_cause_histogram: HashMap<ExitClause, u64>,
    /// Observations processed while a position was open
    pub active_periods: usize,
    /// Total observations processed
    pub total_periods: usize,
}

impl StatsAggregator {
    /// Build stats from a run's outputs.
    ///
    /// In-position ticks are reconstructed from the entry/exit flags the
    /// same way the engine counts them: state is sampled at the start of
    /// each step, so the entry tick counts as flat and the exit tick as
    /// open.
    pub fn from_run(annotated: &[AnnotatedObservation], recorder: &TradeRecorder) -> Self {
        let mut exit_cause_histogram: HashMap<ExitClause, u64> =
            ExitClause::all().into_iter().map(|c| (c, 0)).collect();

        for exit in recorder.exits() {
            if let Some(clause) = exit.exit_clause {
                *exit_cause_histogram.entry(clause).or_insert(0) += 1;
            }
        }

        let mut open = false;
        let mut active_periods = 0usize;
        for row in annotated {
            if open {
                active_periods += 1;
            }
            if row.entry {
                open = true;
            }
            if row.exit {
                open = false;
            }
        }

        Self {
            exit_cause_histogram,
            active_periods,
            total_periods: annotated.len(),
        }
    }

    /// Percentage of observations spent in a position, in [0, 100].
    /// Defined as 0 for an empty run.
    pub fn time_utilization(&self) -> f64 {
        if self.total_periods == 0 {
            return 0.0;
        }
        (self.active_periods as f64 / self.total_periods as f64) * 100.0
    }

    /// Count for one exit clause.
    pub fn exits_by(&self, clause: ExitClause) -> u64 {
        self.exit_cause_histogram.get(&clause).copied().unwrap_or(0)
    }

    /// Total closed trades.
    pub fn total_exits(&self) -> u64 {
        self.exit_cause_histogram.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::feed::MarketObservation;
    use crate::sim::engine::Simulator;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 24, hour, 0, 0).unwrap()
    }

    fn obs(hour: u32, spot: f64, perp: f64, funding_rate: f64) -> MarketObservation {
        MarketObservation {
            timestamp: ts(hour),
            spot,
            perp,
            funding_rate,
        }
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            initial_capital: 100_000.0,
            funding_threshold: 0.0,
            exit_price_multiplier: 1.0,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn test_empty_run_yields_zero_utilization() {
        let result = Simulator::new(config()).unwrap().run(&[]);
        let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);

        assert_eq!(stats.time_utilization(), 0.0);
        assert_eq!(stats.total_exits(), 0);
    }

    #[test]
    fn test_histogram_counts_clauses() {
        let observations = vec![
            obs(0, 10.0, 10.5, 0.001),
            obs(1, 10.0, 9.9, 0.001), // premium collapse
            obs(2, 10.0, 10.2, 0.001),
            obs(3, 10.0, 11.5, 0.001), // stop-loss
            obs(4, 10.0, 10.2, 0.001),
            obs(5, 10.0, 10.3, -0.001), // funding below threshold
        ];
        let result = Simulator::new(config()).unwrap().run(&observations);
        let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);

        assert_eq!(stats.exits_by(ExitClause::PremiumCollapse), 1);
        assert_eq!(stats.exits_by(ExitClause::StopLoss), 1);
        assert_eq!(stats.exits_by(ExitClause::FundingBelowThreshold), 1);
        assert_eq!(stats.total_exits(), 3);
    }

    #[test]
    fn test_utilization_counting() {
        // Entry at t0 (flat at start of step), open during t1 and t2 (exit
        // tick counts), flat at t3: 2 active out of 4.
        let observations = vec![
            obs(0, 10.0, 10.5, 0.001),
            obs(1, 10.0, 10.4, 0.001),
            obs(2, 10.0, 9.9, 0.001),
            obs(3, 10.0, 9.8, 0.001),
        ];
        let result = Simulator::new(config()).unwrap().run(&observations);
        let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);

        assert_eq!(stats.active_periods, 2);
        assert_eq!(stats.total_periods, 4);
        assert!((stats.time_utilization() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_utilization_bounds() {
        // Position held through end of data: every tick after the entry is
        // active, so utilization approaches but never exceeds 100.
        let observations: Vec<_> = (0..10).map(|i| obs(i, 10.0, 10.5, 0.001)).collect();
        let result = Simulator::new(config()).unwrap().run(&observations);
        let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);

        assert_eq!(stats.active_periods, 9);
        let utilization = stats.time_utilization();
        assert!((0.0..=100.0).contains(&utilization));
        assert!((utilization - 90.0).abs() < 1e-12);
    }
}
