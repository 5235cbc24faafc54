//! Derived records produced by a backtest run.
//!
//! Metrics, window performance and summaries are recomputed from the scored
//! predictions of each run; none of them is stored independently of the
//! [`BacktestResult`] that carries them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BacktestError;
use crate::types::{BacktestConfig, EvaluationPeriod, ModelId, ScoredPrediction};
use crate::window::WindowId;

/// One equal-width probability bin of the calibration curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    /// Inclusive lower edge.
    pub lower: f64,
    /// Upper edge (inclusive for the last bin).
    pub upper: f64,
    /// Predictions in the bin.
    pub count: usize,
    /// Mean predicted probability.
    pub mean_predicted: f64,
    /// Mean realized outcome.
    pub mean_actual: f64,
}

/// Result of the reference staking simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    /// Bankroll before the first bet.
    pub starting_bankroll: Decimal,
    /// Bankroll after the last bet.
    pub final_bankroll: Decimal,
    /// Highest bankroll reached.
    pub peak_bankroll: Decimal,
    /// Number of staked bets.
    pub bets_placed: usize,
    /// Sum of stakes.
    pub total_staked: Decimal,
    /// `final_bankroll − starting_bankroll`.
    pub net_profit: Decimal,
    /// `net_profit / total_staked`, 0 with no bets.
    pub roi: f64,
    /// Mean per-bet return over its standard deviation, 0 with fewer than two bets.
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline as a fraction of the peak.
    pub max_drawdown: f64,
}

impl FinancialMetrics {
    /// Neutral metrics for a run with no bets.
    #[must_use]
    pub fn flat(starting_bankroll: Decimal) -> Self {
        Self {
            starting_bankroll,
            final_bankroll: starting_bankroll,
            peak_bankroll: starting_bankroll,
            bets_placed: 0,
            total_staked: Decimal::ZERO,
            net_profit: Decimal::ZERO,
            roi: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
        }
    }
}

/// Probabilistic and financial metrics of a scored-prediction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Number of scored predictions.
    pub total: usize,
    /// Predictions classified correct.
    pub correct: usize,
    /// `correct / total`.
    pub accuracy: f64,
    /// Mean squared error of probability vs outcome.
    pub brier_score: f64,
    /// Mean binary cross-entropy with clamped probabilities.
    pub log_loss: f64,
    /// Expected calibration error over ten bins.
    pub expected_calibration_error: f64,
    /// Mean predicted confidence.
    pub avg_confidence: f64,
    /// Non-empty calibration bins.
    pub calibration: Vec<CalibrationBin>,
    /// Reference staking simulation.
    pub financial: FinancialMetrics,
}

impl BacktestMetrics {
    /// Neutral metrics for an empty prediction list.
    ///
    /// Accuracy, Brier, log loss, ECE and confidence are 0; the bankroll is
    /// untouched. Downstream aggregation checks `total` before dividing.
    #[must_use]
    pub fn empty(starting_bankroll: Decimal) -> Self {
        Self {
            total: 0,
            correct: 0,
            accuracy: 0.0,
            brier_score: 0.0,
            log_loss: 0.0,
            expected_calibration_error: 0.0,
            avg_confidence: 0.0,
            calibration: Vec::new(),
            financial: FinancialMetrics::flat(starting_bankroll),
        }
    }
}

/// Performance of one window inside a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPerformance {
    /// The window.
    pub window: WindowId,
    /// Scored predictions in the window.
    pub predictions: usize,
    /// Accuracy in the window.
    pub accuracy: f64,
    /// Brier score in the window.
    pub brier_score: f64,
    /// Mean confidence in the window.
    pub avg_confidence: f64,
    /// Accuracy delta against the immediately preceding window in
    /// `T24 → T6 → T1 → T30` order, when that window was evaluated.
    pub improvement_vs_previous: Option<f64>,
}

/// Human-facing diagnostics derived from metrics and window performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    /// Window with the highest accuracy.
    pub best_window: Option<WindowId>,
    /// Window with the lowest accuracy.
    pub worst_window: Option<WindowId>,
    /// Context factors present in at least 10% of predictions.
    pub significant_factors: BTreeSet<String>,
    /// Correlation between confidence and correctness, floored at 0.
    pub model_reliability: f64,
    /// Set when the raw correlation was negative.
    pub reliability_warning: Option<String>,
    /// `max(0, 1 − 2·stddev(window accuracies))`.
    pub temporal_consistency: f64,
    /// Threshold-driven recommendations.
    pub recommendations: Vec<String>,
}

/// Units excluded from scoring, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    /// State insufficient at the freeze instant.
    pub insufficient_data: usize,
    /// Prediction confidence below the configured minimum.
    pub low_confidence: usize,
    /// No realized outcome.
    pub outcome_unavailable: usize,
    /// Store read timed out.
    pub store_timeouts: usize,
    /// Store read failed.
    pub store_errors: usize,
}

impl ExclusionCounts {
    /// Units lost to missing or failing data, excluding intentional confidence filtering.
    #[must_use]
    pub fn data_losses(&self) -> usize {
        self.insufficient_data + self.outcome_unavailable + self.store_timeouts + self.store_errors
    }

    /// Counts `count` units excluded by `error`.
    ///
    /// Fatal errors are not exclusions and are ignored.
    pub fn record(&mut self, error: &BacktestError, count: usize) {
        match error {
            BacktestError::InsufficientData { .. } => self.insufficient_data += count,
            BacktestError::OutcomeUnavailable { .. } => self.outcome_unavailable += count,
            BacktestError::ExternalStoreTimeout { .. } => self.store_timeouts += count,
            BacktestError::Store(_) => self.store_errors += count,
            BacktestError::InvalidWindow(_)
            | BacktestError::ConfigValidation(_)
            | BacktestError::Cancelled { .. } => {}
        }
    }

    /// Adds another breakdown into this one.
    pub fn merge(&mut self, other: &ExclusionCounts) {
        self.insufficient_data += other.insufficient_data;
        self.low_confidence += other.low_confidence;
        self.outcome_unavailable += other.outcome_unavailable;
        self.store_timeouts += other.store_timeouts;
        self.store_errors += other.store_errors;
    }
}

/// Persistence state of a period result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStatus {
    /// Written to the result store.
    Persisted,
    /// Write failed after retrying.
    Failed,
    /// Not written; the run was read-only.
    Skipped,
}

/// Outcome of backtesting one period under one config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Run that produced this result.
    pub run_id: Uuid,
    /// When the run started. Part of the idempotency key.
    pub recorded_at: DateTime<Utc>,
    /// Period evaluated.
    pub period: EvaluationPeriod,
    /// Configuration used.
    pub config: BacktestConfig,
    /// Weight snapshot versions used per window (ensemble only).
    pub weight_versions: BTreeMap<WindowId, u64>,
    /// Scored predictions in chronological order.
    pub predictions: Vec<ScoredPrediction>,
    /// Metrics over all predictions.
    pub metrics: BacktestMetrics,
    /// Per-window breakdown in refinement order.
    pub windows: Vec<WindowPerformance>,
    /// Diagnostics.
    pub summary: BacktestSummary,
    /// Units eligible for scoring.
    pub eligible: usize,
    /// `predictions.len() / eligible`, 1.0 when nothing was eligible.
    pub coverage: f64,
    /// Exclusions by reason.
    pub exclusions: ExclusionCounts,
    /// Persistence state.
    pub persistence: PersistenceStatus,
}

impl BacktestResult {
    /// Idempotency key `(period, config, recorded_at)`.
    #[must_use]
    pub fn idempotency_key(&self) -> (String, String, DateTime<Utc>) {
        (self.period.key(), self.config.key(), self.recorded_at)
    }
}

/// Versioned ensemble weights for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    /// Window the weights apply to.
    pub window: WindowId,
    /// Monotonic version per window; 0 denotes the implicit equal-weight table.
    pub version: u64,
    /// Instant from which the snapshot is active.
    pub effective_from: DateTime<Utc>,
    /// Normalised weights per base model.
    pub weights: BTreeMap<ModelId, f64>,
}

impl WeightSnapshot {
    /// Equal weights over `models`, version 0.
    #[must_use]
    pub fn equal(window: WindowId, models: &[ModelId], effective_from: DateTime<Utc>) -> Self {
        let share = if models.is_empty() {
            0.0
        } else {
            1.0 / models.len() as f64
        };
        Self {
            window,
            version: 0,
            effective_from,
            weights: models.iter().map(|m| (m.clone(), share)).collect(),
        }
    }

    /// Weight of `model`, 0 if absent.
    #[must_use]
    pub fn weight(&self, model: &str) -> f64 {
        self.weights.get(model).copied().unwrap_or(0.0)
    }
}

/// One observed absolute error of a base model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelErrorSample {
    /// Base model.
    pub model_id: ModelId,
    /// Window the prediction was issued in.
    pub window: WindowId,
    /// `|probability − outcome|`.
    pub absolute_error: f64,
    /// When the outcome settled.
    pub recorded_at: DateTime<Utc>,
}
