//! Domain types shared by the backtest engine and its stores.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::window::WindowId;

/// Identifier of a base model inside the ensemble (e.g. `"elo"`).
pub type ModelId = String;

/// Absolute error strictly below this value classifies a prediction as correct.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Betting market a prediction is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketId {
    /// Home team wins in regular time.
    HomeWin,
    /// Regular-time draw.
    Draw,
    /// Away team wins in regular time.
    AwayWin,
    /// Three or more goals in total.
    Over25,
    /// Both teams score at least once.
    BothTeamsScore,
}

impl MarketId {
    /// Every supported market.
    pub const ALL: [MarketId; 5] = [
        MarketId::HomeWin,
        MarketId::Draw,
        MarketId::AwayWin,
        MarketId::Over25,
        MarketId::BothTeamsScore,
    ];

    /// Canonical identifier string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MarketId::HomeWin => "home_win",
            MarketId::Draw => "draw",
            MarketId::AwayWin => "away_win",
            MarketId::Over25 => "over_2_5",
            MarketId::BothTeamsScore => "btts",
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketId {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarketId::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BacktestError::ConfigValidation(format!("unknown market: {s}")))
    }
}

/// Prediction strategy family driven by the backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    /// Weighted combination of base strategies.
    Ensemble,
    /// Context-adjusted predictor (rivalry, weather, table pressure).
    Contextual,
    /// Constant reference predictor.
    Baseline,
}

impl ModelKind {
    /// Canonical identifier string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Ensemble => "ensemble",
            ModelKind::Contextual => "contextual",
            ModelKind::Baseline => "baseline",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ensemble" => Ok(ModelKind::Ensemble),
            "contextual" => Ok(ModelKind::Contextual),
            "baseline" => Ok(ModelKind::Baseline),
            other => Err(BacktestError::ConfigValidation(format!(
                "unknown model kind: {other}"
            ))),
        }
    }
}

/// Inclusive range of matchweeks covered by a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchweekRange {
    /// First matchweek in the period.
    pub first: u32,
    /// Last matchweek in the period.
    pub last: u32,
}

/// Chronological slice of history evaluated as one walk-forward step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPeriod {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Season label, e.g. `"2023-24"`.
    pub season_label: String,
    /// Matchweeks covered.
    pub matchweeks: MatchweekRange,
}

impl EvaluationPeriod {
    /// Creates a new period.
    #[must_use]
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        season_label: impl Into<String>,
        matchweeks: MatchweekRange,
    ) -> Self {
        Self {
            start,
            end,
            season_label: season_label.into(),
            matchweeks,
        }
    }

    /// Returns true if `kickoff` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, kickoff: DateTime<Utc>) -> bool {
        kickoff >= self.start && kickoff < self.end
    }

    /// Stable key used for idempotent persistence.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}:mw{}-{}:{}",
            self.season_label,
            self.matchweeks.first,
            self.matchweeks.last,
            self.start.format("%Y%m%d")
        )
    }
}

/// Immutable configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Strategy family to evaluate.
    pub model_kind: ModelKind,
    /// Windows to evaluate. Usually one; several windows enable window comparison.
    pub windows: Vec<WindowId>,
    /// Markets to predict for each match.
    pub markets: BTreeSet<MarketId>,
    /// Predictions below this confidence are skipped.
    pub min_confidence: Option<f64>,
    /// Cap on matches enumerated per period.
    pub max_matches: Option<usize>,
}

impl BacktestConfig {
    /// Creates a single-window config predicting the home-win market.
    #[must_use]
    pub fn new(model_kind: ModelKind, window: WindowId) -> Self {
        Self {
            model_kind,
            windows: vec![window],
            markets: BTreeSet::from([MarketId::HomeWin]),
            min_confidence: None,
            max_matches: None,
        }
    }

    /// Replaces the evaluated windows.
    #[must_use]
    pub fn with_windows(mut self, windows: impl IntoIterator<Item = WindowId>) -> Self {
        self.windows = windows.into_iter().collect();
        self
    }

    /// Replaces the evaluated markets.
    #[must_use]
    pub fn with_markets(mut self, markets: impl IntoIterator<Item = MarketId>) -> Self {
        self.markets = markets.into_iter().collect();
        self
    }

    /// Sets the minimum confidence filter.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    /// Caps matches per period.
    #[must_use]
    pub fn with_max_matches(mut self, max_matches: usize) -> Self {
        self.max_matches = Some(max_matches);
        self
    }

    /// Windows sorted along refinement order.
    #[must_use]
    pub fn windows_in_order(&self) -> Vec<WindowId> {
        let set: BTreeSet<WindowId> = self.windows.iter().copied().collect();
        set.into_iter().collect()
    }

    /// Validates the config once per run.
    ///
    /// # Errors
    /// Returns [`BacktestError::ConfigValidation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.windows.is_empty() {
            return Err(BacktestError::ConfigValidation(
                "at least one window is required".to_string(),
            ));
        }
        if self.windows_in_order().len() != self.windows.len() {
            return Err(BacktestError::ConfigValidation(
                "windows must not repeat".to_string(),
            ));
        }
        if self.markets.is_empty() {
            return Err(BacktestError::ConfigValidation(
                "at least one market is required".to_string(),
            ));
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(BacktestError::ConfigValidation(format!(
                    "min_confidence must be within [0, 1], got {min}"
                )));
            }
        }
        if self.max_matches == Some(0) {
            return Err(BacktestError::ConfigValidation(
                "max_matches must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable key used for idempotent persistence and report headers.
    #[must_use]
    pub fn key(&self) -> String {
        let windows: Vec<&str> = self.windows_in_order().iter().map(|w| w.as_str()).collect();
        let markets: Vec<&str> = self.markets.iter().map(|m| m.as_str()).collect();
        let min_conf = self
            .min_confidence
            .map_or_else(|| "none".to_string(), |c| format!("{c:.2}"));
        let max = self
            .max_matches
            .map_or_else(|| "all".to_string(), |m| m.to_string());
        format!(
            "{}|{}|{}|minc={}|max={}",
            self.model_kind,
            windows.join(","),
            markets.join(","),
            min_conf,
            max
        )
    }
}

/// Output contract every model adapter satisfies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticPrediction {
    /// Probability that the market resolves to 1.
    pub probability: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    /// Per-base-model share of the final probability (ensemble only).
    pub per_model_contribution: Option<BTreeMap<ModelId, f64>>,
    /// Context factors that adjusted the prediction (contextual only).
    pub context_factors: Option<BTreeSet<String>>,
}

impl ProbabilisticPrediction {
    /// Creates a plain prediction, clamping both values into `[0, 1]`.
    #[must_use]
    pub fn new(probability: f64, confidence: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            per_model_contribution: None,
            context_factors: None,
        }
    }

    /// Attaches per-model contributions.
    #[must_use]
    pub fn with_contributions(mut self, contributions: BTreeMap<ModelId, f64>) -> Self {
        self.per_model_contribution = Some(contributions);
        self
    }

    /// Attaches triggered context factors.
    #[must_use]
    pub fn with_context_factors(mut self, factors: BTreeSet<String>) -> Self {
        self.context_factors = Some(factors);
        self
    }
}

/// Classification of a scored prediction under [`DECISION_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// `|error| < 0.5`.
    Correct,
    /// `|error| >= 0.5`.
    Incorrect,
}

/// One prediction scored against its realized outcome.
///
/// Created once per (match, window, market) and never mutated; fields are
/// read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    match_id: String,
    kickoff: DateTime<Utc>,
    window: WindowId,
    market: MarketId,
    prediction: ProbabilisticPrediction,
    outcome: f64,
    absolute_error: f64,
    classification: Classification,
}

impl ScoredPrediction {
    /// Scores `prediction` against `outcome` (0/1 or continuous in `[0, 1]`).
    #[must_use]
    pub fn score(
        match_id: impl Into<String>,
        kickoff: DateTime<Utc>,
        window: WindowId,
        market: MarketId,
        prediction: ProbabilisticPrediction,
        outcome: f64,
    ) -> Self {
        let outcome = outcome.clamp(0.0, 1.0);
        let absolute_error = (prediction.probability - outcome).abs();
        let classification = if absolute_error < DECISION_THRESHOLD {
            Classification::Correct
        } else {
            Classification::Incorrect
        };
        Self {
            match_id: match_id.into(),
            kickoff,
            window,
            market,
            prediction,
            outcome,
            absolute_error,
            classification,
        }
    }

    /// Match identifier.
    #[must_use]
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Match kickoff.
    #[must_use]
    pub fn kickoff(&self) -> DateTime<Utc> {
        self.kickoff
    }

    /// Window the prediction was frozen for.
    #[must_use]
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Market predicted.
    #[must_use]
    pub fn market(&self) -> MarketId {
        self.market
    }

    /// The model output.
    #[must_use]
    pub fn prediction(&self) -> &ProbabilisticPrediction {
        &self.prediction
    }

    /// Predicted probability.
    #[must_use]
    pub fn probability(&self) -> f64 {
        self.prediction.probability
    }

    /// Predicted confidence.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.prediction.confidence
    }

    /// Realized outcome.
    #[must_use]
    pub fn outcome(&self) -> f64 {
        self.outcome
    }

    /// `|probability − outcome|`.
    #[must_use]
    pub fn absolute_error(&self) -> f64 {
        self.absolute_error
    }

    /// Correct/incorrect classification.
    #[must_use]
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Convenience for `classification() == Correct`.
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.classification == Classification::Correct
    }

    /// Chronological sort key: kickoff, match, window order, market.
    #[must_use]
    pub fn sort_key(&self) -> (DateTime<Utc>, &str, WindowId, MarketId) {
        (self.kickoff, self.match_id.as_str(), self.window, self.market)
    }
}
