//! Side-by-side evaluation of model kinds over the same periods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use matchcast_core::{
    AccuracySignificance, BacktestMetrics, BacktestResult, EvaluationPeriod, MarketId, ModelKind,
    ScoredPrediction, StakingPolicy, WindowId, DECISION_THRESHOLD,
};

use super::bootstrap::{BootstrapConfig, BootstrapResampler, BootstrapResult};
use super::metrics::MetricsEngine;

/// One model's pooled performance and its standing against the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub model_kind: ModelKind,
    /// 1 is best (lowest Brier score).
    pub rank: usize,
    /// Metrics over every period's predictions, in chronological order.
    pub metrics: BacktestMetrics,
    pub coverage: f64,
    /// Accuracy against `max(baseline accuracy, 0.5)`.
    pub significance: AccuracySignificance,
    /// Mean per-prediction squared-error difference against the baseline on
    /// the units both scored; negative favours this model. `None` for the
    /// baseline itself or when no unit was shared.
    pub brier_vs_baseline: Option<BootstrapResult>,
}

/// Ranked comparison over one season.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelComparison {
    pub season_label: String,
    pub periods: Vec<EvaluationPeriod>,
    pub rankings: Vec<ModelScore>,
}

impl ModelComparison {
    /// Builds the comparison from per-kind period results.
    ///
    /// `runs` must contain the baseline kind for significance testing.
    #[must_use]
    pub fn from_runs(
        season_label: impl Into<String>,
        periods: Vec<EvaluationPeriod>,
        runs: &BTreeMap<ModelKind, Vec<BacktestResult>>,
        staking: &StakingPolicy,
        bootstrap: BootstrapConfig,
    ) -> Self {
        let engine = MetricsEngine::new(staking.clone());
        let resampler = BootstrapResampler::new(bootstrap);

        let pooled: BTreeMap<ModelKind, (Vec<ScoredPrediction>, f64)> = runs
            .iter()
            .map(|(kind, results)| (*kind, pool(results)))
            .collect();

        let baseline = pooled.get(&ModelKind::Baseline);
        let baseline_accuracy = baseline
            .map(|(predictions, _)| engine.compute(predictions).accuracy)
            .unwrap_or(0.0);
        let reference = baseline_accuracy.max(DECISION_THRESHOLD);

        let mut rankings: Vec<ModelScore> = pooled
            .iter()
            .map(|(kind, (predictions, coverage))| {
                let metrics = engine.compute(predictions);
                let significance =
                    AccuracySignificance::from_counts(metrics.correct, metrics.total, reference);
                let brier_vs_baseline = match (kind, baseline) {
                    (ModelKind::Baseline, _) | (_, None) => None,
                    (_, Some((reference_predictions, _))) => {
                        let diffs = paired_brier_differences(predictions, reference_predictions);
                        (!diffs.is_empty()).then(|| resampler.mean_ci(&diffs))
                    }
                };
                ModelScore {
                    model_kind: *kind,
                    rank: 0,
                    metrics,
                    coverage: *coverage,
                    significance,
                    brier_vs_baseline,
                }
            })
            .collect();

        rankings.sort_by(|a, b| {
            a.metrics
                .brier_score
                .total_cmp(&b.metrics.brier_score)
                .then_with(|| a.model_kind.cmp(&b.model_kind))
        });
        for (i, score) in rankings.iter_mut().enumerate() {
            score.rank = i + 1;
        }

        Self {
            season_label: season_label.into(),
            periods,
            rankings,
        }
    }

    /// Best-ranked model kind.
    #[must_use]
    pub fn best(&self) -> Option<ModelKind> {
        self.rankings.first().map(|s| s.model_kind)
    }

    #[must_use]
    pub fn score(&self, kind: ModelKind) -> Option<&ModelScore> {
        self.rankings.iter().find(|s| s.model_kind == kind)
    }
}

/// Predictions of every period in order, and overall coverage.
fn pool(results: &[BacktestResult]) -> (Vec<ScoredPrediction>, f64) {
    let predictions: Vec<ScoredPrediction> = results
        .iter()
        .flat_map(|r| r.predictions.iter().cloned())
        .collect();
    let eligible: usize = results.iter().map(|r| r.eligible).sum();
    let coverage = if eligible == 0 {
        1.0
    } else {
        predictions.len() as f64 / eligible as f64
    };
    (predictions, coverage)
}

/// `(p_model - y)^2 - (p_baseline - y)^2` for every unit both scored.
fn paired_brier_differences(model: &[ScoredPrediction], baseline: &[ScoredPrediction]) -> Vec<f64> {
    let reference: BTreeMap<(&str, WindowId, MarketId), f64> = baseline
        .iter()
        .map(|p| ((p.match_id(), p.window(), p.market()), p.absolute_error()))
        .collect();
    model
        .iter()
        .filter_map(|p| {
            reference
                .get(&(p.match_id(), p.window(), p.market()))
                .map(|base_error| p.absolute_error().powi(2) - base_error.powi(2))
        })
        .collect()
}
