//! Append-only trade event log.

use crate::sim::position::ExitClause;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an event opens or closes a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entry,
    Exit,
}

/// One entry in the trade ledger. A trade's life is fully described by its
/// Entry event and the matching Exit event.
///
/// `fees` carries the fee charged *at this event*: the entry fee on Entry
/// records, the exit fee on Exit records. PnL fields are zero on Entry
/// records; on Exit records `pnl_after_fees` nets out both fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: EventKind,
    pub time: DateTime<Utc>,
    pub spot_price: f64,
    pub perp_price: f64,
    pub funding_rate: f64,
    pub allocated_capital: f64,
    /// Running capital at the time of the event (post-update on Exit)
    pub current_capital: f64,
    pub reason: String,
    pub fees: f64,
    pub pnl_before_fees: f64,
    pub pnl_after_fees: f64,
    pub cumulative_pnl_after_fees: f64,
    /// Exit clause, present on Exit events only
    pub exit_clause: Option<ExitClause>,
}

/// Append-only, chronological log of trade events. Records are immutable
/// once written; the state machine's single-position invariant guarantees
/// Entries and Exits strictly alternate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeRecorder {
    events: Vec<TradeEvent>,
}

impl TradeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Called only by the state machine.
    pub fn record(&mut self, event: TradeEvent) {
        self.events.push(event);
    }

    /// All recorded events, in chronological order.
    pub fn events(&self) -> &[TradeEvent] {
        &self.events
    }

    /// Exit events only, in chronological order.
    pub fn exits(&self) -> impl Iterator<Item = &TradeEvent> {
        self.events.iter().filter(|e| e.kind == EventKind::Exit)
    }

    /// Entry events only, in chronological order.
    pub fn entries(&self) -> impl Iterator<Item = &TradeEvent> {
        self.events.iter().filter(|e| e.kind == EventKind::Entry)
    }

    /// Completed trades as (entry, exit) pairs. A trailing unmatched Entry
    /// (position still open at end of data) is not included.
    pub fn trades(&self) -> Vec<(&TradeEvent, &TradeEvent)> {
        let mut pairs = Vec::new();
        let mut pending: Option<&TradeEvent> = None;

        for event in &self.events {
            match event.kind {
                EventKind::Entry => pending = Some(event),
                EventKind::Exit => {
                    if let Some(entry) = pending.take() {
                        pairs.push((entry, event));
                    }
                }
            }
        }

        pairs
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(kind: EventKind, hour: u32) -> TradeEvent {
        TradeEvent {
            kind,
            time: Utc.with_ymd_and_hms(2025, 3, 24, hour, 0, 0).unwrap(),
            spot_price: 10.0,
            perp_price: 10.2,
            funding_rate: 0.0001,
            allocated_capital: 20_000.0,
            current_capital: 23_000.0,
            reason: String::new(),
            fees: 0.0,
            pnl_before_fees: 0.0,
            pnl_after_fees: 0.0,
            cumulative_pnl_after_fees: 0.0,
            exit_clause: (kind == EventKind::Exit).then_some(ExitClause::StopLoss),
        }
    }

    #[test]
    fn test_trade_pairing() {
        let mut recorder = TradeRecorder::new();
        recorder.record(event(EventKind::Entry, 0));
        recorder.record(event(EventKind::Exit, 2));
        recorder.record(event(EventKind::Entry, 5));
        recorder.record(event(EventKind::Exit, 7));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].0.kind, EventKind::Entry);
        assert_eq!(trades[0].1.kind, EventKind::Exit);
        assert!(trades[1].0.time < trades[1].1.time);
    }

    #[test]
    fn test_unmatched_trailing_entry_excluded() {
        let mut recorder = TradeRecorder::new();
        recorder.record(event(EventKind::Entry, 0));
        recorder.record(event(EventKind::Exit, 2));
        recorder.record(event(EventKind::Entry, 5));

        assert_eq!(recorder.trades().len(), 1);
        assert_eq!(recorder.entries().count(), 2);
        assert_eq!(recorder.exits().count(), 1);
    }
}
