//! The trade-simulation state machine.

use crate::config::StrategyConfig;
use crate::feed::MarketObservation;
use crate::sim::ledger::CapitalLedger;
use crate::sim::position::{ExitClause, OpenPosition, PositionState};
use crate::sim::recorder::{EventKind, TradeEvent, TradeRecorder};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ENTRY_REASON: &str = "Entry: Perp > Spot & Funding Rate > Threshold";

/// One input observation annotated with the trade events and the ledger
/// snapshot as of that step. The yield columns form a step function over
/// the timeline: constant between trades, updated exactly at exit steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedObservation {
    pub timestamp: DateTime<Utc>,
    pub spot: f64,
    pub perp: f64,
    pub funding_rate: f64,
    pub entry: bool,
    pub exit: bool,
    pub exit_clause: Option<ExitClause>,
    pub yield_before_fees: f64,
    pub yield_after_fees: f64,
}

/// Complete output of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub config: StrategyConfig,
    pub annotated: Vec<AnnotatedObservation>,
    pub recorder: TradeRecorder,
    pub ledger: CapitalLedger,
    /// Position still active after the last observation, if any. Such a
    /// position is not force-closed and contributes no Exit event.
    pub open_at_end: Option<OpenPosition>,
}

impl SimulationResult {
    /// Export the trade ledger to CSV.
    pub fn trades_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        writeln!(
            file,
            "time,type,spot_price,perp_price,funding_rate,allocated_capital,current_capital,reason,fees,trade_pnl_before_fees,trade_pnl_after_fees,cumulative_pnl_after_fees"
        )?;

        for event in self.recorder.events() {
            let kind = match event.kind {
                EventKind::Entry => "entry",
                EventKind::Exit => "exit",
            };
            writeln!(
                file,
                "{},{},{},{},{},{},{},\"{}\",{},{},{},{}",
                event.time.to_rfc3339(),
                kind,
                event.spot_price,
                event.perp_price,
                event.funding_rate,
                event.allocated_capital,
                event.current_capital,
                event.reason,
                event.fees,
                event.pnl_before_fees,
                event.pnl_after_fees,
                event.cumulative_pnl_after_fees,
            )?;
        }

        Ok(())
    }

    /// Export the annotated observation sequence to CSV.
    pub fn annotated_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        writeln!(
            file,
            "timestamp,spot,perp,funding_rate,entry,exit,exit_clause,yield_before_fees,yield_after_fees"
        )?;

        for row in &self.annotated {
            writeln!(
                file,
                "{},{},{},{},{},{},{},{},{}",
                row.timestamp.to_rfc3339(),
                row.spot,
                row.perp,
                row.funding_rate,
                row.entry,
                row.exit,
                row.exit_clause.map(|c| c.code()).unwrap_or(0),
                row.yield_before_fees,
                row.yield_after_fees,
            )?;
        }

        Ok(())
    }
}

/// Single-pass backtest state machine.
///
/// Starts `Flat`; opens a position when the perp trades above spot while
/// funding exceeds the threshold; closes it on the first matching exit
/// clause, checked in fixed priority order. The terminal state is whatever
/// holds after the last observation.
pub struct Simulator {
    config: StrategyConfig,
    state: PositionState,
    ledger: CapitalLedger,
    recorder: TradeRecorder,
}

impl Simulator {
    /// Create a simulator, rejecting invalid configuration up front.
    pub fn new(config: StrategyConfig) -> Result<Self> {
        config.validate()?;
        let ledger = CapitalLedger::new(config.initial_capital);
        Ok(Self {
            config,
            state: PositionState::Flat,
            ledger,
            recorder: TradeRecorder::new(),
        })
    }

    /// Run the simulation over a clean, timestamp-ordered sequence.
    ///
    /// The feed is responsible for excluding malformed rows before this
    /// point; the engine does not special-case missing data.
    pub fn run(mut self, observations: &[MarketObservation]) -> SimulationResult {
        info!("Starting simulation over {} observations", observations.len());

        let mut annotated = Vec::with_capacity(observations.len());

        for (i, obs) in observations.iter().enumerate() {
            let (entry, exit_clause) = self.step(obs);

            // Every step carries the ledger snapshot as of that step.
            annotated.push(AnnotatedObservation {
                timestamp: obs.timestamp,
                spot: obs.spot,
                perp: obs.perp,
                funding_rate: obs.funding_rate,
                entry,
                exit: exit_clause.is_some(),
                exit_clause,
                yield_before_fees: self.ledger.cumulative_before_fees(),
                yield_after_fees: self.ledger.cumulative_after_fees(),
            });

            if i % 1000 == 0 && i > 0 {
                debug!(
                    "Progress: {}/{}, running capital: {:.2}",
                    i,
                    observations.len(),
                    self.ledger.running_capital()
                );
            }
        }

        let open_at_end = match self.state {
            PositionState::Open(position) => {
                warn!(
                    entry_time = %position.entry_time,
                    allocated = position.allocated_capital,
                    "Position still open at end of data; no Exit event emitted"
                );
                Some(position)
            }
            PositionState::Flat => None,
        };

        info!(
            "Simulation complete: {} trades closed, final capital {:.2}",
            self.recorder.exits().count(),
            self.ledger.running_capital()
        );

        SimulationResult {
            config: self.config,
            annotated,
            recorder: self.recorder,
            ledger: self.ledger,
            open_at_end,
        }
    }

    /// Process one observation. Returns (entered, exit clause).
    fn step(&mut self, obs: &MarketObservation) -> (bool, Option<ExitClause>) {
        match &mut self.state {
            PositionState::Flat => {
                if obs.perp > obs.spot && obs.funding_rate > self.config.funding_threshold {
                    self.enter(obs);
                    (true, None)
                } else {
                    (false, None)
                }
            }
            PositionState::Open(position) => {
                // Fixed priority order: stop-loss wins every tie.
                let clause = if obs.perp >= self.config.stop_loss_multiplier * position.entry_perp {
                    Some(ExitClause::StopLoss)
                } else if obs.perp < self.config.exit_price_multiplier * obs.spot {
                    Some(ExitClause::PremiumCollapse)
                } else if obs.funding_rate < self.config.funding_threshold {
                    Some(ExitClause::FundingBelowThreshold)
                } else {
                    None
                };

                match clause {
                    Some(clause) => {
                        // The exit tick disqualifies the trade, so its own
                        // funding is excluded: the accrual interval is
                        // half-open, [entry, exit).
                        self.exit(obs, clause);
                        (false, Some(clause))
                    }
                    None => {
                        position.accrue(obs.funding_rate);
                        (false, None)
                    }
                }
            }
        }
    }

    fn enter(&mut self, obs: &MarketObservation) {
        let running_capital = self.ledger.running_capital();
        let allocated_capital = self.config.allocation_fraction * running_capital;
        let entry_fee = allocated_capital * self.config.entry_fee_rate();

        let mut position = OpenPosition {
            entry_time: obs.timestamp,
            entry_spot: obs.spot,
            entry_perp: obs.perp,
            allocated_capital,
            entry_fee,
            funding_accrued: 0.0,
        };
        // The entry tick's own funding counts toward the trade.
        position.accrue(obs.funding_rate);

        debug!(
            time = %obs.timestamp,
            allocated = allocated_capital,
            "Entering position"
        );

        self.recorder.record(TradeEvent {
            kind: EventKind::Entry,
            time: obs.timestamp,
            spot_price: obs.spot,
            perp_price: obs.perp,
            funding_rate: obs.funding_rate,
            allocated_capital,
            current_capital: running_capital,
            reason: ENTRY_REASON.to_string(),
            fees: entry_fee,
            pnl_before_fees: 0.0,
            pnl_after_fees: 0.0,
            cumulative_pnl_after_fees: self.ledger.cumulative_after_fees(),
            exit_clause: None,
        });

        self.state = PositionState::Open(position);
    }

    fn exit(&mut self, obs: &MarketObservation, clause: ExitClause) {
        let position = match std::mem::replace(&mut self.state, PositionState::Flat) {
            PositionState::Open(position) => position,
            PositionState::Flat => unreachable!("exit is only reached from Open"),
        };

        let exit_fee = position.allocated_capital * self.config.exit_fee_rate();
        let pnl_before_fees = position.funding_accrued;
        let pnl_after_fees = pnl_before_fees - position.entry_fee - exit_fee;

        self.ledger.apply_trade(pnl_before_fees, pnl_after_fees);

        debug!(
            time = %obs.timestamp,
            reason = clause.reason(),
            pnl_after_fees,
            "Exiting position"
        );

        self.recorder.record(TradeEvent {
            kind: EventKind::Exit,
            time: obs.timestamp,
            spot_price: obs.spot,
            perp_price: obs.perp,
            funding_rate: obs.funding_rate,
            allocated_capital: position.allocated_capital,
            current_capital: self.ledger.running_capital(),
            reason: clause.reason().to_string(),
            fees: exit_fee,
            pnl_before_fees,
            pnl_after_fees,
            cumulative_pnl_after_fees: self.ledger.cumulative_after_fees(),
            exit_clause: Some(clause),
        });
    }
}
