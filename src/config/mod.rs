//! Strategy configuration.
//!
//! Loads settings from a config file and environment variables, with
//! construction-time validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Parameters of the delta-neutral funding-rate strategy.
///
/// All fees are fractional (0.0007 = 0.07% of allocated capital per leg).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Seed capital for the ledger, in quote currency
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Fraction of running capital committed per trade, (0, 1]
    #[serde(default = "default_allocation_fraction")]
    pub allocation_fraction: f64,
    /// Perp-price multiple above entry that forces a stop-loss exit
    #[serde(default = "default_stop_loss_multiplier")]
    pub stop_loss_multiplier: f64,
    /// Spot-price multiple below which the premium-collapse exit fires
    #[serde(default = "default_exit_price_multiplier")]
    pub exit_price_multiplier: f64,
    /// Spot leg fee at entry
    #[serde(default = "default_fee_spot_entry")]
    pub fee_spot_entry: f64,
    /// Perp leg fee at entry
    #[serde(default = "default_fee_perp_entry")]
    pub fee_perp_entry: f64,
    /// Spot leg fee at exit
    #[serde(default = "default_fee_spot_exit")]
    pub fee_spot_exit: f64,
    /// Perp leg fee at exit
    #[serde(default = "default_fee_perp_exit")]
    pub fee_perp_exit: f64,
    /// Minimum funding rate to enter or retain a position
    #[serde(default = "default_funding_threshold")]
    pub funding_threshold: f64,
}

// Default value functions

fn default_initial_capital() -> f64 {
    23_000.0
}

fn default_allocation_fraction() -> f64 {
    0.89
}

fn default_stop_loss_multiplier() -> f64 {
    1.1
}

fn default_exit_price_multiplier() -> f64 {
    1.0
}

fn default_fee_spot_entry() -> f64 {
    0.0007 // 0.07%
}

fn default_fee_perp_entry() -> f64 {
    0.00045 // 0.045%
}

fn default_fee_spot_exit() -> f64 {
    0.0004 // 0.04%
}

fn default_fee_perp_exit() -> f64 {
    0.00015 // 0.015%
}

fn default_funding_threshold() -> f64 {
    0.00001
}

impl StrategyConfig {
    /// Load configuration from a config file and environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("FAB"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values. Violations are fatal, not retried.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.initial_capital.is_finite() && self.initial_capital > 0.0,
            "initial_capital must be positive, got {}",
            self.initial_capital
        );

        anyhow::ensure!(
            self.allocation_fraction > 0.0 && self.allocation_fraction <= 1.0,
            "allocation_fraction must be in (0, 1], got {}",
            self.allocation_fraction
        );

        anyhow::ensure!(
            self.stop_loss_multiplier.is_finite() && self.stop_loss_multiplier > 1.0,
            "stop_loss_multiplier must be greater than 1, got {}",
            self.stop_loss_multiplier
        );

        anyhow::ensure!(
            self.exit_price_multiplier.is_finite() && self.exit_price_multiplier > 0.0,
            "exit_price_multiplier must be positive, got {}",
            self.exit_price_multiplier
        );

        for (name, fee) in [
            ("fee_spot_entry", self.fee_spot_entry),
            ("fee_perp_entry", self.fee_perp_entry),
            ("fee_spot_exit", self.fee_spot_exit),
            ("fee_perp_exit", self.fee_perp_exit),
        ] {
            anyhow::ensure!(
                (0.0..1.0).contains(&fee),
                "{} must be in [0, 1), got {}",
                name,
                fee
            );
        }

        anyhow::ensure!(
            self.funding_threshold.is_finite(),
            "funding_threshold must be finite"
        );

        Ok(())
    }

    /// Combined entry fee rate across both legs.
    pub fn entry_fee_rate(&self) -> f64 {
        self.fee_spot_entry + self.fee_perp_entry
    }

    /// Combined exit fee rate across both legs.
    pub fn exit_fee_rate(&self) -> f64 {
        self.fee_spot_exit + self.fee_perp_exit
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            allocation_fraction: default_allocation_fraction(),
            stop_loss_multiplier: default_stop_loss_multiplier(),
            exit_price_multiplier: default_exit_price_multiplier(),
            fee_spot_entry: default_fee_spot_entry(),
            fee_perp_entry: default_fee_perp_entry(),
            fee_spot_exit: default_fee_spot_exit(),
            fee_perp_exit: default_fee_perp_exit(),
            funding_threshold: default_funding_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StrategyConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_allocation() {
        let config = StrategyConfig {
            allocation_fraction: 0.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_allocation_above_one() {
        let config = StrategyConfig {
            allocation_fraction: 1.5,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_fee() {
        let config = StrategyConfig {
            fee_perp_exit: -0.0001,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_capital() {
        let config = StrategyConfig {
            initial_capital: 0.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            initial_capital: -100.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_allocation_is_valid() {
        let config = StrategyConfig {
            allocation_fraction: 1.0,
            ..StrategyConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_combined_fee_rates() {
        let config = StrategyConfig::default();
        assert!((config.entry_fee_rate() - 0.00115).abs() < 1e-12);
        assert!((config.exit_fee_rate() - 0.00055).abs() < 1e-12);
    }
}
