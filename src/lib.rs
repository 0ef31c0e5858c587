//! # Funding Arb Backtest
//!
//! Backtester for a delta-neutral funding-rate arbitrage strategy: long spot,
//! short perpetual, collecting funding payments while the perp trades at a
//! premium.
//!
//! ## Architecture
//!
//! - `config`: Strategy parameters and validation
//! - `feed`: Market-data loading and input validation
//! - `sim`: The trade-simulation core: state machine, capital ledger,
//!   trade recorder, and post-hoc stats
//! - `metrics`: Summary metrics (APY/APR, win rate, fee impact) over a run

pub mod config;
pub mod feed;
pub mod metrics;
pub mod sim;

pub use config::StrategyConfig;
