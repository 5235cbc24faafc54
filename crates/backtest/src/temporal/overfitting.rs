//! Chronological in-sample / out-of-sample degradation check over persisted
//! period results.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use matchcast_core::{
    AccuracySignificance, BacktestMetrics, BacktestResult, ModelKind, ScoredPrediction,
    StakingPolicy, DECISION_THRESHOLD,
};

use super::metrics::MetricsEngine;

/// Share of periods used as the in-sample half.
pub const IN_SAMPLE_SHARE: f64 = 0.7;

/// Risk level from the relative accuracy drop out of sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverfittingRisk {
    /// Drop of at most 5%, or an improvement.
    Low,
    /// 5% to 10%.
    Medium,
    /// 10% to 20%.
    High,
    /// More than 20%.
    Severe,
}

impl OverfittingRisk {
    #[must_use]
    pub fn from_degradation(degradation_ratio: f64) -> Self {
        if degradation_ratio <= 0.05 {
            Self::Low
        } else if degradation_ratio <= 0.10 {
            Self::Medium
        } else if degradation_ratio <= 0.20 {
            Self::High
        } else {
            Self::Severe
        }
    }
}

/// How much worse the later periods scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceDegradation {
    /// Out-of-sample accuracy over in-sample accuracy (1.0 = unchanged).
    pub accuracy_ratio: f64,
    /// In-sample minus out-of-sample accuracy.
    pub accuracy_diff: f64,
    /// Out-of-sample minus in-sample Brier score; positive is worse.
    pub brier_diff: f64,
    pub overfitting_risk: OverfittingRisk,
}

impl PerformanceDegradation {
    #[must_use]
    pub fn from_metrics(in_sample: &BacktestMetrics, out_of_sample: &BacktestMetrics) -> Self {
        let accuracy_ratio = if in_sample.accuracy > 0.0 {
            out_of_sample.accuracy / in_sample.accuracy
        } else {
            1.0
        };
        let degradation_ratio = if in_sample.accuracy > 0.0 {
            (in_sample.accuracy - out_of_sample.accuracy) / in_sample.accuracy
        } else {
            0.0
        };

        Self {
            accuracy_ratio,
            accuracy_diff: in_sample.accuracy - out_of_sample.accuracy,
            brier_diff: out_of_sample.brier_score - in_sample.brier_score,
            overfitting_risk: OverfittingRisk::from_degradation(degradation_ratio),
        }
    }
}

/// Out-of-sample accuracy tested against a coin flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceTest {
    #[serde(flatten)]
    pub accuracy: AccuracySignificance,
    /// Wilson lower bound above 0.5.
    pub has_edge: bool,
}

impl SignificanceTest {
    #[must_use]
    pub fn from_metrics(metrics: &BacktestMetrics) -> Self {
        let accuracy =
            AccuracySignificance::from_counts(metrics.correct, metrics.total, DECISION_THRESHOLD);
        let has_edge = accuracy.wilson_ci_lower > DECISION_THRESHOLD;
        Self { accuracy, has_edge }
    }
}

/// Result of [`OverfittingReport::from_results`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverfittingReport {
    pub model_kind: ModelKind,
    pub in_sample_periods: usize,
    pub out_of_sample_periods: usize,
    pub in_sample: BacktestMetrics,
    pub out_of_sample: BacktestMetrics,
    pub degradation: PerformanceDegradation,
    pub significance: SignificanceTest,
}

impl OverfittingReport {
    /// Splits `results` chronologically and compares the two halves.
    ///
    /// Repeated runs of the same period keep only the most recent result.
    ///
    /// # Errors
    /// Fails when fewer than two distinct periods are available.
    pub fn from_results(
        model_kind: ModelKind,
        results: &[BacktestResult],
        staking: &StakingPolicy,
    ) -> Result<Self> {
        let mut latest: BTreeMap<String, &BacktestResult> = BTreeMap::new();
        for result in results.iter().filter(|r| r.config.model_kind == model_kind) {
            let key = result.period.key();
            match latest.get(&key) {
                Some(existing) if existing.recorded_at >= result.recorded_at => {}
                _ => {
                    latest.insert(key, result);
                }
            }
        }

        let mut periods: Vec<&BacktestResult> = latest.into_values().collect();
        periods.sort_by_key(|r| r.period.start);
        let n = periods.len();
        if n < 2 {
            bail!("overfitting check for {model_kind} needs at least 2 periods, found {n}");
        }

        let split = ((n as f64 * IN_SAMPLE_SHARE).round() as usize).clamp(1, n - 1);
        let (in_sample, out_of_sample) = periods.split_at(split);

        let engine = MetricsEngine::new(staking.clone());
        let in_sample_metrics = engine.compute(&pooled(in_sample));
        let out_of_sample_metrics = engine.compute(&pooled(out_of_sample));

        Ok(Self {
            model_kind,
            in_sample_periods: in_sample.len(),
            out_of_sample_periods: out_of_sample.len(),
            degradation: PerformanceDegradation::from_metrics(
                &in_sample_metrics,
                &out_of_sample_metrics,
            ),
            significance: SignificanceTest::from_metrics(&out_of_sample_metrics),
            in_sample: in_sample_metrics,
            out_of_sample: out_of_sample_metrics,
        })
    }

    /// Significant out-of-sample edge with at most medium overfitting risk.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.significance.accuracy.is_significant
            && self.significance.has_edge
            && matches!(
                self.degradation.overfitting_risk,
                OverfittingRisk::Low | OverfittingRisk::Medium
            )
    }
}

fn pooled(results: &[&BacktestResult]) -> Vec<ScoredPrediction> {
    results
        .iter()
        .flat_map(|r| r.predictions.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use matchcast_core::{
        BacktestConfig, BacktestSummary, EvaluationPeriod, ExclusionCounts, MarketId,
        MatchweekRange, PersistenceStatus, ProbabilisticPrediction, WindowId,
    };
    use uuid::Uuid;

    fn result(index: i64, correct: usize, total: usize) -> BacktestResult {
        let start = Utc.with_ymd_and_hms(2023, 8, 1, 0, 0, 0).unwrap() + Duration::weeks(4 * index);
        let period = EvaluationPeriod::new(
            start,
            start + Duration::weeks(4),
            "2023-24",
            MatchweekRange {
                first: 4 * index as u32 + 1,
                last: 4 * index as u32 + 4,
            },
        );
        let predictions: Vec<ScoredPrediction> = (0..total)
            .map(|i| {
                ScoredPrediction::score(
                    format!("p{index}m{i}"),
                    start + Duration::days(1),
                    WindowId::T1,
                    MarketId::HomeWin,
                    ProbabilisticPrediction::new(0.8, 0.7),
                    if i < correct { 1.0 } else { 0.0 },
                )
            })
            .collect();
        BacktestResult {
            run_id: Uuid::nil(),
            recorded_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            metrics: MetricsEngine::new(StakingPolicy::default()).compute(&predictions),
            period,
            config: BacktestConfig::new(ModelKind::Contextual, WindowId::T1),
            weight_versions: BTreeMap::new(),
            predictions,
            windows: Vec::new(),
            summary: BacktestSummary::default(),
            eligible: total,
            coverage: 1.0,
            exclusions: ExclusionCounts::default(),
            persistence: PersistenceStatus::Persisted,
        }
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(OverfittingRisk::from_degradation(-0.1), OverfittingRisk::Low);
        assert_eq!(OverfittingRisk::from_degradation(0.05), OverfittingRisk::Low);
        assert_eq!(OverfittingRisk::from_degradation(0.08), OverfittingRisk::Medium);
        assert_eq!(OverfittingRisk::from_degradation(0.15), OverfittingRisk::High);
        assert_eq!(OverfittingRisk::from_degradation(0.5), OverfittingRisk::Severe);
    }

    #[test]
    fn later_collapse_is_severe() {
        // Seven strong periods then three weak ones.
        let mut results: Vec<BacktestResult> = (0..7).map(|i| result(i, 9, 10)).collect();
        results.extend((7..10).map(|i| result(i, 3, 10)));

        let report =
            OverfittingReport::from_results(ModelKind::Contextual, &results, &StakingPolicy::default())
                .unwrap();
        assert_eq!(report.in_sample_periods, 7);
        assert_eq!(report.out_of_sample_periods, 3);
        assert_eq!(report.degradation.overfitting_risk, OverfittingRisk::Severe);
        assert!(report.degradation.brier_diff > 0.0);
        assert!(!report.passed());
    }

    #[test]
    fn stable_strong_model_passes() {
        let results: Vec<BacktestResult> = (0..10).map(|i| result(i, 45, 50)).collect();
        let report =
            OverfittingReport::from_results(ModelKind::Contextual, &results, &StakingPolicy::default())
                .unwrap();
        assert_eq!(report.degradation.overfitting_risk, OverfittingRisk::Low);
        assert!(report.significance.has_edge);
        assert!(report.passed());
    }

    #[test]
    fn single_period_is_rejected() {
        let results = vec![result(0, 5, 10)];
        assert!(
            OverfittingReport::from_results(ModelKind::Contextual, &results, &StakingPolicy::default())
                .is_err()
        );
    }

    #[test]
    fn reruns_of_a_period_keep_latest() {
        let mut stale = result(0, 0, 10);
        stale.recorded_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let results = vec![stale, result(0, 10, 10), result(1, 10, 10)];
        let report =
            OverfittingReport::from_results(ModelKind::Contextual, &results, &StakingPolicy::default())
                .unwrap();
        assert_eq!(report.in_sample_periods, 1);
        assert!((report.in_sample.accuracy - 1.0).abs() < f64::EPSILON);
    }
}
