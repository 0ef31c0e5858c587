//! Market-data feed for the simulation.
//!
//! The simulation core consumes an ordered, gap-free, NaN-free sequence of
//! observations. Everything needed to produce such a sequence lives here:
//! CSV import, joining separate price and funding series by timestamp, and
//! validation of the ordering contract.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// One market observation: spot price, perpetual price, and the funding
/// rate paid per interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: DateTime<Utc>,
    pub spot: f64,
    pub perp: f64,
    pub funding_rate: f64,
}

impl MarketObservation {
    /// True when every field carries a usable value.
    pub fn is_clean(&self) -> bool {
        self.spot.is_finite() && self.perp.is_finite() && self.funding_rate.is_finite()
    }
}

/// Errors produced while loading or validating feed data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("timestamps must be strictly increasing: {current} follows {previous}")]
    NonMonotonicTimestamp {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("data file contains no usable rows")]
    Empty,
}

/// Source of observation sequences for the simulator.
pub trait MarketFeed {
    /// All observations in the given time range, in timestamp order.
    fn observations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MarketObservation>;

    /// First and last timestamp in the data, if any.
    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

/// CSV-backed feed for historical backtests.
///
/// Expected CSV format:
/// ```csv
/// timestamp,spot_open,perp_open,funding_rate
/// 2025-03-24T00:00:00Z,12.45,12.48,0.0000125
/// ```
#[derive(Debug, Clone)]
pub struct CsvFeed {
    observations: Vec<MarketObservation>,
    rows_dropped: usize,
}

impl CsvFeed {
    /// Load observations from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_content(&content)
    }

    /// Load observations from CSV content.
    ///
    /// Rows with missing or non-finite fields are dropped before the
    /// ordering check; the core never sees them.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut observations = Vec::new();
        let mut rows_dropped = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            // Skip header
            if line_num == 0 && line.starts_with("timestamp") {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            match parse_row(line) {
                Ok(obs) if obs.is_clean() => observations.push(obs),
                Ok(_) => rows_dropped += 1,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))
                }
            }
        }

        if observations.is_empty() {
            return Err(FeedError::Empty.into());
        }

        validate_ordering(&observations)?;

        if rows_dropped > 0 {
            debug!("Dropped {} rows with missing fields", rows_dropped);
        }

        Ok(Self {
            observations,
            rows_dropped,
        })
    }

    /// Build a feed from in-memory observations (test and library use).
    pub fn from_observations(observations: Vec<MarketObservation>) -> Result<Self> {
        let (observations, rows_dropped) = {
            let before = observations.len();
            let clean: Vec<_> = observations.into_iter().filter(|o| o.is_clean()).collect();
            let dropped = before - clean.len();
            (clean, dropped)
        };

        if observations.is_empty() {
            return Err(FeedError::Empty.into());
        }

        validate_ordering(&observations)?;
        Ok(Self {
            observations,
            rows_dropped,
        })
    }

    /// Number of usable observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// True when the feed holds no observations.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Rows excluded during loading because a field was missing or NaN.
    pub fn rows_dropped(&self) -> usize {
        self.rows_dropped
    }

    /// Borrow the full observation sequence.
    pub fn all(&self) -> &[MarketObservation] {
        &self.observations
    }

    /// Scan for gaps: intervals between consecutive observations larger
    /// than `expected_interval`. Returns (position, previous, current).
    pub fn find_gaps(
        &self,
        expected_interval: Duration,
    ) -> Vec<(usize, DateTime<Utc>, DateTime<Utc>)> {
        self.observations
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[1].timestamp - w[0].timestamp > expected_interval)
            .map(|(i, w)| (i + 1, w[0].timestamp, w[1].timestamp))
            .collect()
    }
}

impl MarketFeed for CsvFeed {
    fn observations(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MarketObservation> {
        self.observations
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp <= end)
            .copied()
            .collect()
    }

    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

fn validate_ordering(observations: &[MarketObservation]) -> Result<(), FeedError> {
    for w in observations.windows(2) {
        if w[1].timestamp <= w[0].timestamp {
            return Err(FeedError::NonMonotonicTimestamp {
                previous: w[0].timestamp,
                current: w[1].timestamp,
            });
        }
    }
    Ok(())
}

fn parse_row(line: &str) -> Result<MarketObservation> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 4 {
        anyhow::bail!(
            "Expected 4 columns (timestamp,spot_open,perp_open,funding_rate), got {}",
            parts.len()
        );
    }

    Ok(MarketObservation {
        timestamp: parts[0]
            .trim()
            .parse()
            .with_context(|| format!("Invalid timestamp: {}", parts[0]))?,
        spot: parse_field(parts[1])?,
        perp: parse_field(parts[2])?,
        funding_rate: parse_field(parts[3])?,
    })
}

fn parse_field(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        // Missing value; the row will be dropped by the cleanliness filter.
        return Ok(f64::NAN);
    }
    raw.parse()
        .with_context(|| format!("Invalid numeric field: {}", raw))
}

/// Inner-join three `(timestamp, value)` series into observations.
///
/// Timestamps present in all three series produce one observation; rows
/// missing from any series, or carrying a non-finite value, are dropped.
/// Inputs need not be sorted; the output is.
pub fn merge_series(
    spot: &[(DateTime<Utc>, f64)],
    perp: &[(DateTime<Utc>, f64)],
    funding: &[(DateTime<Utc>, f64)],
) -> Vec<MarketObservation> {
    use std::collections::BTreeMap;

    let perp_by_ts: BTreeMap<_, _> = perp.iter().copied().collect();
    let funding_by_ts: BTreeMap<_, _> = funding.iter().copied().collect();

    let mut merged: Vec<MarketObservation> = spot
        .iter()
        .filter_map(|&(ts, spot)| {
            let perp = *perp_by_ts.get(&ts)?;
            let funding_rate = *funding_by_ts.get(&ts)?;
            let obs = MarketObservation {
                timestamp: ts,
                spot,
                perp,
                funding_rate,
            };
            obs.is_clean().then_some(obs)
        })
        .collect();

    merged.sort_by_key(|o| o.timestamp);
    merged
}
