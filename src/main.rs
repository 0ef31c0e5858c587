//! Funding Arbitrage Backtest - Main Entry Point
//!
//! Command-line runner: replay a market data file through the delta-neutral
//! funding strategy and report performance, or sanity-check a data file.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use funding_arb_backtest::config::StrategyConfig;
use funding_arb_backtest::feed::{CsvFeed, MarketFeed};
use funding_arb_backtest::metrics::RunMetrics;
use funding_arb_backtest::sim::{Simulator, StatsAggregator};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Funding Arbitrage Backtest CLI
#[derive(Parser)]
#[command(name = "funding-arb-backtest")]
#[command(version, about = "Backtester for delta-neutral funding rate arbitrage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the strategy over historical data
    Backtest {
        /// Path to CSV data file (timestamp,spot_open,perp_open,funding_rate)
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD), defaults to start of data
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to end of data
        #[arg(short, long)]
        end: Option<String>,

        /// Initial capital, overrides configuration
        #[arg(short = 'b', long)]
        capital: Option<f64>,

        /// Funding rate entry threshold, overrides configuration
        #[arg(short = 't', long)]
        threshold: Option<f64>,

        /// Output directory for trade and timeline CSVs
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Inspect a data file: range, row counts, gaps
    Check {
        /// Path to CSV data file
        #[arg(short, long)]
        data: String,

        /// Expected sampling interval in minutes
        #[arg(short, long, default_value = "60")]
        interval_minutes: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    match cli.command {
        Commands::Backtest {
            data,
            start,
            end,
            capital,
            threshold,
            output,
        } => run_backtest(
            &data,
            start.as_deref(),
            end.as_deref(),
            capital,
            threshold,
            output.as_deref(),
        ),
        Commands::Check {
            data,
            interval_minutes,
        } => check_data(&data, interval_minutes),
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_arb_backtest=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_target(true)
        .init();

    Ok(())
}

fn parse_date(s: &str, end_of_day: bool) -> Result<chrono::DateTime<chrono::Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    // Midnight and 23:59:59 always exist for a valid NaiveDate
    Ok(time.context("invalid time of day")?.and_utc())
}

fn run_backtest(
    data_path: &str,
    start_str: Option<&str>,
    end_str: Option<&str>,
    capital: Option<f64>,
    threshold: Option<f64>,
    output_dir: Option<&str>,
) -> Result<()> {
    info!("📊 Loading data from: {}", data_path);
    let feed = CsvFeed::new(data_path)?;

    let (data_start, data_end) = feed
        .available_range()
        .context("data file contains no usable rows")?;
    info!(
        "   Data range: {} to {} ({} rows, {} dropped)",
        data_start.format("%Y-%m-%d %H:%M"),
        data_end.format("%Y-%m-%d %H:%M"),
        feed.len(),
        feed.rows_dropped()
    );

    let start = match start_str {
        Some(s) => parse_date(s, false)?,
        None => data_start,
    };
    let end = match end_str {
        Some(s) => parse_date(s, true)?,
        None => data_end,
    };

    let mut config = StrategyConfig::load()?;
    if let Some(capital) = capital {
        config.initial_capital = capital;
    }
    if let Some(threshold) = threshold {
        config.funding_threshold = threshold;
    }

    info!("💰 Initial capital: ${:.2}", config.initial_capital);
    info!("📅 Period: {} to {}", start, end);

    let observations = feed.observations(start, end);
    let simulator = Simulator::new(config)?;
    let result = simulator.run(&observations);

    let stats = StatsAggregator::from_run(&result.annotated, &result.recorder);
    let metrics = RunMetrics::calculate(&result, &stats);

    println!("\n{}", metrics.summary());

    if let Some(open) = &result.open_at_end {
        info!(
            "Open position at end of data: entered {} with ${:.2} allocated, ${:.4} funding accrued",
            open.entry_time, open.allocated_capital, open.funding_accrued
        );
    }

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir))?;

        let trades_path = format!("{}/trades.csv", dir);
        result.trades_to_csv(&trades_path)?;
        info!("📁 Trade log saved to: {}", trades_path);

        let timeline_path = format!("{}/timeline.csv", dir);
        result.annotated_to_csv(&timeline_path)?;
        info!("📁 Annotated timeline saved to: {}", timeline_path);

        let metrics_path = format!("{}/metrics.json", dir);
        std::fs::write(&metrics_path, serde_json::to_string_pretty(&metrics)?)?;
        info!("📁 Metrics saved to: {}", metrics_path);
    }

    Ok(())
}

fn check_data(data_path: &str, interval_minutes: i64) -> Result<()> {
    info!("🔍 Checking data file: {}", data_path);
    let feed = CsvFeed::new(data_path)?;

    let (start, end) = feed
        .available_range()
        .context("data file contains no usable rows")?;

    println!("File:          {}", data_path);
    println!("Rows:          {}", feed.len());
    println!("Rows dropped:  {}", feed.rows_dropped());
    println!("Range:         {} to {}", start, end);
    println!("Span:          {:.1} days", (end - start).num_seconds() as f64 / 86_400.0);

    let gaps = feed.find_gaps(Duration::minutes(interval_minutes));
    if gaps.is_empty() {
        println!("Gaps:          none at {}m interval", interval_minutes);
    } else {
        println!("Gaps:          {} found at {}m interval", gaps.len(), interval_minutes);
        for (position, previous, current) in gaps.iter().take(20) {
            println!(
                "  row {}: {} -> {} ({:.1}h missing)",
                position,
                previous,
                current,
                (*current - *previous).num_seconds() as f64 / 3600.0
            );
        }
        if gaps.len() > 20 {
            println!("  ... and {} more", gaps.len() - 20);
        }
    }

    Ok(())
}
