//! Model adapters: one case per [`ModelKind`].
//!
//! Every adapter refuses to predict on insufficient state. The ensemble reads
//! only the weight snapshots it was built with, which the runner freezes at
//! the start of each period.

use std::collections::{BTreeMap, BTreeSet};

use matchcast_core::{
    BacktestError, MarketId, ModelId, ModelKind, ProbabilisticPrediction, WeightSnapshot,
    WindowId,
};

use tracing::debug;

use super::reconstructor::MatchState;
use super::strategies::BaseStrategy;

/// Constant probability of the baseline predictor.
pub const BASELINE_PROBABILITY: f64 = 0.5;

/// Confidence reported by the baseline predictor.
pub const BASELINE_CONFIDENCE: f64 = 0.5;

/// Confidence lost per triggered context factor.
const CONTEXT_FACTOR_PENALTY: f64 = 0.05;

/// Context factor names reported by the contextual model.
pub mod factors {
    pub const RIVALRY: &str = "rivalry";
    pub const ADVERSE_WEATHER: &str = "adverse_weather";
    pub const RELEGATION_PRESSURE: &str = "relegation_pressure";
    pub const TITLE_RACE: &str = "title_race";
    pub const MISSING_STARTERS: &str = "missing_starters";
}

/// Weighted combination of base strategies.
#[derive(Debug, Clone)]
pub struct EnsembleModel {
    snapshots: BTreeMap<WindowId, WeightSnapshot>,
}

impl EnsembleModel {
    /// Builds an ensemble over frozen per-window snapshots.
    #[must_use]
    pub fn new(snapshots: BTreeMap<WindowId, WeightSnapshot>) -> Self {
        Self { snapshots }
    }

    /// Snapshot used for `window`.
    #[must_use]
    pub fn snapshot(&self, window: WindowId) -> Option<&WeightSnapshot> {
        self.snapshots.get(&window)
    }

    fn predict(
        &self,
        state: &MatchState,
        market: MarketId,
    ) -> Result<ProbabilisticPrediction, BacktestError> {
        let insufficient = |reason: &str| BacktestError::InsufficientData {
            match_id: state.match_id.clone(),
            window: state.window,
            reason: reason.to_string(),
        };

        let snapshot = self
            .snapshots
            .get(&state.window)
            .ok_or_else(|| insufficient("no weight snapshot for window"))?;

        let mut registered = 0.0_f64;
        let mut estimates: BTreeMap<ModelId, (f64, f64)> = BTreeMap::new();
        for (model_id, weight) in &snapshot.weights {
            if *weight <= 0.0 {
                continue;
            }
            let Some(strategy) = BaseStrategy::from_id(model_id) else {
                debug!(
                    model_id = %model_id,
                    version = snapshot.version,
                    "Ignoring unknown model id in weight snapshot"
                );
                continue;
            };
            // Unknown ids never count toward coverage.
            registered += *weight;
            if let Some(p) = strategy.estimate(state, market) {
                estimates.insert(model_id.clone(), (*weight, p));
            }
        }

        let used: f64 = estimates.values().map(|(w, _)| w).sum();
        if estimates.is_empty() || used <= 0.0 {
            return Err(insufficient("no base strategy could price the market"));
        }

        let probability = estimates.values().map(|(w, p)| w * p).sum::<f64>() / used;
        let variance = estimates
            .values()
            .map(|(w, p)| w * (p - probability).powi(2))
            .sum::<f64>()
            / used;
        let coverage = if registered > 0.0 { used / registered } else { 0.0 };
        let confidence = (1.0 - 2.0 * variance.sqrt()) * coverage;

        let contributions = estimates.into_iter().map(|(id, (_, p))| (id, p)).collect();
        Ok(ProbabilisticPrediction::new(probability, confidence).with_contributions(contributions))
    }
}

/// Context-adjusted predictor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualModel;

impl ContextualModel {
    fn predict(
        self,
        state: &MatchState,
        market: MarketId,
    ) -> Result<ProbabilisticPrediction, BacktestError> {
        let base = [BaseStrategy::OddsImplied, BaseStrategy::Elo, BaseStrategy::Poisson]
            .into_iter()
            .find_map(|s| s.estimate(state, market))
            .ok_or_else(|| BacktestError::InsufficientData {
                match_id: state.match_id.clone(),
                window: state.window,
                reason: "no prior for contextual adjustment".to_string(),
            })?;

        let mut p = base;
        let mut triggered = BTreeSet::new();

        if let Some(context) = &state.context {
            if context.is_rivalry {
                triggered.insert(factors::RIVALRY.to_string());
                p = match market {
                    MarketId::HomeWin | MarketId::AwayWin => p * 0.95,
                    MarketId::Draw => p + 0.03,
                    MarketId::Over25 | MarketId::BothTeamsScore => p,
                };
            }
            if context.relegation_pressure() {
                triggered.insert(factors::RELEGATION_PRESSURE.to_string());
                p = match market {
                    MarketId::Draw => p + 0.02,
                    MarketId::Over25 => p * 0.97,
                    _ => p,
                };
            }
            if context.title_race() {
                triggered.insert(factors::TITLE_RACE.to_string());
                if market == MarketId::Draw {
                    p += 0.02;
                }
            }
        }

        if let Some(weather) = &state.weather {
            if weather.is_adverse() {
                triggered.insert(factors::ADVERSE_WEATHER.to_string());
                let damping = weather.goal_damping();
                p = match market {
                    MarketId::Over25 | MarketId::BothTeamsScore => p * damping,
                    MarketId::Draw => p + 0.02,
                    MarketId::HomeWin | MarketId::AwayWin => p,
                };
            }
        }

        if let Some(lineups) = &state.lineups {
            let home = f64::from(lineups.home_missing_starters);
            let away = f64::from(lineups.away_missing_starters);
            if lineups.home_missing_starters >= 2 || lineups.away_missing_starters >= 2 {
                triggered.insert(factors::MISSING_STARTERS.to_string());
                let shift = (away - home) * 0.015;
                p = match market {
                    MarketId::HomeWin => p + shift,
                    MarketId::AwayWin => p - shift,
                    _ => p,
                };
            }
        }

        let p = p.clamp(0.01, 0.99);
        let confidence =
            0.5 + (p - 0.5).abs() - CONTEXT_FACTOR_PENALTY * triggered.len() as f64;
        Ok(ProbabilisticPrediction::new(p, confidence).with_context_factors(triggered))
    }
}

/// Fixed, context-free reference predictor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineModel;

impl BaselineModel {
    fn predict(self) -> ProbabilisticPrediction {
        ProbabilisticPrediction::new(BASELINE_PROBABILITY, BASELINE_CONFIDENCE)
    }
}

/// Prediction strategy driven by the runner.
#[derive(Debug, Clone)]
pub enum ModelAdapter {
    Ensemble(EnsembleModel),
    Contextual(ContextualModel),
    Baseline(BaselineModel),
}

impl ModelAdapter {
    /// Builds the adapter for `kind`. Snapshots are only used by the ensemble.
    #[must_use]
    pub fn for_kind(kind: ModelKind, snapshots: BTreeMap<WindowId, WeightSnapshot>) -> Self {
        match kind {
            ModelKind::Ensemble => ModelAdapter::Ensemble(EnsembleModel::new(snapshots)),
            ModelKind::Contextual => ModelAdapter::Contextual(ContextualModel),
            ModelKind::Baseline => ModelAdapter::Baseline(BaselineModel),
        }
    }

    /// Kind of this adapter.
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelAdapter::Ensemble(_) => ModelKind::Ensemble,
            ModelAdapter::Contextual(_) => ModelKind::Contextual,
            ModelAdapter::Baseline(_) => ModelKind::Baseline,
        }
    }

    /// Predicts `market` from `state`.
    ///
    /// # Errors
    /// Returns [`BacktestError::InsufficientData`] if the state is insufficient
    /// or the model cannot price the market from it.
    pub fn predict(
        &self,
        state: &MatchState,
        market: MarketId,
    ) -> Result<ProbabilisticPrediction, BacktestError> {
        state.require_sufficient()?;
        match self {
            ModelAdapter::Ensemble(model) => model.predict(state, market),
            ModelAdapter::Contextual(model) => model.predict(state, market),
            ModelAdapter::Baseline(model) => Ok(model.predict()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::reconstructor::Sufficiency;
    use chrono::{DateTime, TimeZone, Utc};
    use matchcast_core::{ContextLayer, LineupLayer, OddsLayer, WeatherLayer};

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 13, 14, 0, 0).unwrap()
    }

    fn state() -> MatchState {
        MatchState {
            match_id: "m1".to_string(),
            home_team: Some("Home".to_string()),
            away_team: Some("Away".to_string()),
            kickoff: kickoff(),
            window: WindowId::T1,
            freeze_instant: kickoff() - chrono::Duration::hours(1),
            weather: None,
            lineups: None,
            context: Some(ContextLayer {
                home_rating: 1600.0,
                away_rating: 1500.0,
                home_expected_goals: 1.7,
                away_expected_goals: 1.0,
                home_table_position: 4,
                away_table_position: 10,
                league_size: 20,
                is_rivalry: false,
            }),
            odds: Some(OddsLayer {
                home: 1.9,
                draw: 3.5,
                away: 4.2,
                over_2_5: Some(1.8),
            }),
            layer_timestamps: BTreeMap::new(),
            sufficiency: Sufficiency::Sufficient,
        }
    }

    fn insufficient() -> MatchState {
        let mut s = state();
        s.sufficiency = Sufficiency::Insufficient("lineups missing".to_string());
        s
    }

    fn snapshot(weights: &[(&str, f64)]) -> BTreeMap<WindowId, WeightSnapshot> {
        BTreeMap::from([(
            WindowId::T1,
            WeightSnapshot {
                window: WindowId::T1,
                version: 3,
                effective_from: kickoff() - chrono::Duration::days(3),
                weights: weights.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            },
        )])
    }

    // ============================================================
    // Refusal on insufficient state
    // ============================================================

    #[test]
    fn every_kind_refuses_insufficient_state() {
        for kind in [ModelKind::Ensemble, ModelKind::Contextual, ModelKind::Baseline] {
            let adapter = ModelAdapter::for_kind(kind, snapshot(&[("elo", 1.0)]));
            let err = adapter.predict(&insufficient(), MarketId::HomeWin).unwrap_err();
            assert!(
                matches!(err, BacktestError::InsufficientData { .. }),
                "{kind} fabricated a prediction"
            );
        }
    }

    // ============================================================
    // Baseline
    // ============================================================

    #[test]
    fn baseline_is_constant() {
        let adapter = ModelAdapter::for_kind(ModelKind::Baseline, BTreeMap::new());
        for market in MarketId::ALL {
            let p = adapter.predict(&state(), market).unwrap();
            assert!((p.probability - 0.5).abs() < f64::EPSILON);
            assert!(p.per_model_contribution.is_none());
            assert!(p.context_factors.is_none());
        }
    }

    // ============================================================
    // Ensemble
    // ============================================================

    #[test]
    fn ensemble_reports_contributions_and_renormalises() {
        let adapter = ModelAdapter::for_kind(
            ModelKind::Ensemble,
            snapshot(&[("odds_implied", 0.5), ("elo", 0.3), ("weather_poisson", 0.2)]),
        );
        let p = adapter.predict(&state(), MarketId::HomeWin).unwrap();
        let contributions = p.per_model_contribution.unwrap();
        // No weather layer: weather_poisson abstains.
        assert_eq!(contributions.len(), 2);
        assert!(contributions.contains_key("odds_implied"));
        assert!(p.probability > 0.0 && p.probability < 1.0);
        assert!(p.confidence < 1.0);
    }

    #[test]
    fn ensemble_single_strategy_reproduces_its_estimate() {
        let adapter = ModelAdapter::for_kind(ModelKind::Ensemble, snapshot(&[("odds_implied", 1.0)]));
        let p = adapter.predict(&state(), MarketId::Over25).unwrap();
        assert!((p.probability - 1.0 / 1.8).abs() < 1e-12);
        assert!((p.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ensemble_ignores_unknown_model_ids_for_coverage() {
        let known = ModelAdapter::for_kind(ModelKind::Ensemble, snapshot(&[("odds_implied", 1.0)]))
            .predict(&state(), MarketId::Over25)
            .unwrap();
        let with_stale = ModelAdapter::for_kind(
            ModelKind::Ensemble,
            snapshot(&[("odds_implied", 1.0), ("retired_model", 2.0)]),
        )
        .predict(&state(), MarketId::Over25)
        .unwrap();
        assert!((with_stale.probability - known.probability).abs() < 1e-12);
        assert!((with_stale.confidence - known.confidence).abs() < 1e-12);
        assert!(!with_stale
            .per_model_contribution
            .unwrap()
            .contains_key("retired_model"));
    }

    #[test]
    fn ensemble_without_snapshot_for_window_refuses() {
        let adapter = ModelAdapter::for_kind(ModelKind::Ensemble, BTreeMap::new());
        assert!(adapter.predict(&state(), MarketId::HomeWin).is_err());
    }

    #[test]
    fn ensemble_refuses_when_no_strategy_prices_market() {
        let adapter = ModelAdapter::for_kind(ModelKind::Ensemble, snapshot(&[("elo", 1.0)]));
        assert!(adapter.predict(&state(), MarketId::BothTeamsScore).is_err());
    }

    // ============================================================
    // Contextual
    // ============================================================

    #[test]
    fn contextual_reports_triggered_factors() {
        let mut s = state();
        if let Some(c) = s.context.as_mut() {
            c.is_rivalry = true;
        }
        s.weather = Some(WeatherLayer {
            temperature_c: 4.0,
            precipitation_mm: 8.0,
            wind_kph: 20.0,
        });
        s.lineups = Some(LineupLayer {
            home_confirmed: true,
            away_confirmed: true,
            home_missing_starters: 3,
            away_missing_starters: 0,
        });

        let adapter = ModelAdapter::for_kind(ModelKind::Contextual, BTreeMap::new());
        let p = adapter.predict(&s, MarketId::HomeWin).unwrap();
        let found = p.context_factors.unwrap();
        assert!(found.contains(factors::RIVALRY));
        assert!(found.contains(factors::ADVERSE_WEATHER));
        assert!(found.contains(factors::MISSING_STARTERS));
        assert!(!found.contains(factors::TITLE_RACE));

        let calm = adapter.predict(&state(), MarketId::HomeWin).unwrap();
        assert!(p.probability < calm.probability);
        assert!(p.confidence < calm.confidence);
    }

    #[test]
    fn contextual_without_any_prior_refuses() {
        let mut s = state();
        s.context = None;
        s.odds = None;
        let adapter = ModelAdapter::for_kind(ModelKind::Contextual, BTreeMap::new());
        assert!(adapter.predict(&s, MarketId::Draw).is_err());
    }
}
