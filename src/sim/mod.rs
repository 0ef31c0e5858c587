//! The trade-simulation core.
//!
//! A single-pass, strictly sequential state machine over market
//! observations. The computation is causal: the capital allocated to trade
//! *k* depends on the realized outcome of trades `1..k-1`, so observations
//! are processed in timestamp order with no reordering.
//!
//! # Example
//!
//! ```rust,ignore
//! use funding_arb_backtest::{config::StrategyConfig, feed::CsvFeed, sim::Simulator};
//!
//! let feed = CsvFeed::new("data/observations.csv")?;
//! let config = StrategyConfig::default();
//! let result = Simulator::new(config)?.run(feed.all());
//! println!("{} closed trades", result.recorder.trades().len());
//! ```

mod engine;
mod ledger;
mod position;
mod recorder;
mod stats;

pub use engine::{AnnotatedObservation, SimulationResult, Simulator};
pub use ledger::CapitalLedger;
pub use position::{ExitClause, OpenPosition, PositionState};
pub use recorder::{EventKind, TradeEvent, TradeRecorder};
pub use stats::StatsAggregator;
