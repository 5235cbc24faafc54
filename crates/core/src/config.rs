use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichmentLayer;
use crate::error::BacktestError;
use crate::types::ModelId;
use crate::window::WindowId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub runner: RunnerConfig,
    pub reconstruction: ReconstructionPolicy,
    pub staking: StakingPolicy,
    pub ensemble: EnsembleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/matchcast".to_string(),
            max_connections: 10,
        }
    }
}

/// Execution limits of the backtest runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Matches simulated concurrently within a period. Bounded by store connections.
    pub concurrency: usize,
    /// Timeout applied to every external store read.
    pub store_timeout_ms: u64,
    /// Extra attempts when persisting a period result fails.
    pub persist_retries: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            store_timeout_ms: 2_000,
            persist_retries: 1,
        }
    }
}

/// Layers a window needs before its state counts as sufficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRequirement {
    /// Layers counted toward sufficiency.
    pub required: BTreeSet<EnrichmentLayer>,
    /// Minimum number of `required` layers that must be available.
    pub min_available: usize,
}

impl WindowRequirement {
    /// Requires every listed layer.
    #[must_use]
    pub fn all_of(layers: impl IntoIterator<Item = EnrichmentLayer>) -> Self {
        let required: BTreeSet<_> = layers.into_iter().collect();
        let min_available = required.len();
        Self {
            required,
            min_available,
        }
    }

    /// Requires at least `min_available` of the listed layers.
    #[must_use]
    pub fn at_least(min_available: usize, layers: impl IntoIterator<Item = EnrichmentLayer>) -> Self {
        Self {
            required: layers.into_iter().collect(),
            min_available,
        }
    }
}

/// Sufficiency policy of the point-in-time reconstructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionPolicy {
    pub windows: BTreeMap<WindowId, WindowRequirement>,
}

impl Default for ReconstructionPolicy {
    fn default() -> Self {
        use EnrichmentLayer::{Context, Lineups, Odds, Weather};
        Self {
            windows: BTreeMap::from([
                (WindowId::T24, WindowRequirement::at_least(1, [Context, Odds])),
                (WindowId::T6, WindowRequirement::at_least(2, [Context, Odds, Weather])),
                (
                    WindowId::T1,
                    WindowRequirement::at_least(3, [Context, Odds, Weather, Lineups]),
                ),
                (
                    WindowId::T30,
                    WindowRequirement::at_least(4, [Context, Odds, Weather, Lineups]),
                ),
            ]),
        }
    }
}

impl ReconstructionPolicy {
    /// Requirement for `window`; windows without an entry require nothing.
    #[must_use]
    pub fn requirement(&self, window: WindowId) -> WindowRequirement {
        self.windows
            .get(&window)
            .cloned()
            .unwrap_or_else(|| WindowRequirement::at_least(0, []))
    }

    /// Overrides the requirement of one window.
    #[must_use]
    pub fn with_requirement(mut self, window: WindowId, requirement: WindowRequirement) -> Self {
        self.windows.insert(window, requirement);
        self
    }
}

/// Reference staking policy for the financial simulation.
///
/// A fixed, documented strategy whose only purpose is to make financial
/// metrics comparable across configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingPolicy {
    pub starting_bankroll: Decimal,
    /// Fraction of the current bankroll staked per bet.
    pub stake_fraction: Decimal,
    /// Bets are placed only when confidence is strictly above this.
    pub confidence_threshold: f64,
}

impl Default for StakingPolicy {
    fn default() -> Self {
        Self {
            starting_bankroll: Decimal::from(1000),
            stake_fraction: Decimal::new(2, 2),
            confidence_threshold: 0.6,
        }
    }
}

/// Nightly ensemble retraining settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub enabled: bool,
    /// Six-field cron expression (with seconds).
    pub cron_schedule: String,
    /// Error history considered per retrain.
    pub lookback_days: i64,
    /// Minimum weight any registered model keeps.
    pub weight_floor: f64,
    /// Samples a model needs before its own error is trusted.
    pub min_samples: usize,
    /// Registered base models.
    pub models: Vec<ModelId>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_schedule: "0 0 3 * * *".to_string(),
            lookback_days: 30,
            weight_floor: 0.05,
            min_samples: 20,
            models: vec![
                "odds_implied".to_string(),
                "elo".to_string(),
                "poisson".to_string(),
                "weather_poisson".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns [`BacktestError::ConfigValidation`] on the first violation.
    pub fn validate(&self) -> Result<(), BacktestError> {
        let invalid = |msg: String| Err(BacktestError::ConfigValidation(msg));

        if self.runner.concurrency == 0 {
            return invalid("runner.concurrency must be positive".to_string());
        }
        if self.runner.store_timeout_ms == 0 {
            return invalid("runner.store_timeout_ms must be positive".to_string());
        }
        if self.staking.starting_bankroll <= Decimal::ZERO {
            return invalid("staking.starting_bankroll must be positive".to_string());
        }
        if self.staking.stake_fraction <= Decimal::ZERO || self.staking.stake_fraction > Decimal::ONE {
            return invalid("staking.stake_fraction must be within (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.staking.confidence_threshold) {
            return invalid("staking.confidence_threshold must be within [0, 1]".to_string());
        }
        for (window, requirement) in &self.reconstruction.windows {
            if requirement.min_available > requirement.required.len() {
                return invalid(format!(
                    "reconstruction.{window}: min_available {} exceeds {} required layers",
                    requirement.min_available,
                    requirement.required.len()
                ));
            }
        }
        if self.ensemble.models.is_empty() {
            return invalid("ensemble.models must not be empty".to_string());
        }
        if self.ensemble.weight_floor < 0.0
            || self.ensemble.weight_floor * self.ensemble.models.len() as f64 >= 1.0
        {
            return invalid(format!(
                "ensemble.weight_floor {} is infeasible for {} models",
                self.ensemble.weight_floor,
                self.ensemble.models.len()
            ));
        }
        if self.ensemble.lookback_days <= 0 {
            return invalid("ensemble.lookback_days must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn default_staking_policy_is_documented_reference() {
        let policy = StakingPolicy::default();
        assert_eq!(policy.starting_bankroll, dec!(1000));
        assert_eq!(policy.stake_fraction, dec!(0.02));
        assert!((policy.confidence_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn later_windows_never_require_less_than_earlier_ones() {
        let policy = ReconstructionPolicy::default();
        let mins: Vec<usize> = WindowId::ORDER
            .iter()
            .map(|w| policy.requirement(*w).min_available)
            .collect();
        assert!(mins.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn impossible_minimum_is_rejected() {
        let mut config = AppConfig::default();
        config.reconstruction = config.reconstruction.with_requirement(
            WindowId::T6,
            WindowRequirement::at_least(3, [EnrichmentLayer::Odds]),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn infeasible_weight_floor_is_rejected() {
        let mut config = AppConfig::default();
        config.ensemble.weight_floor = 0.25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.runner.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_window_requirement_requires_nothing() {
        let policy = ReconstructionPolicy { windows: BTreeMap::new() };
        assert_eq!(policy.requirement(WindowId::T1).min_available, 0);
    }
}
