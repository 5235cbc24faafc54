//! Human-facing diagnostics derived from a scored run.

use std::collections::{BTreeMap, BTreeSet};

use matchcast_core::stats::{pearson_correlation, population_std_dev};
use matchcast_core::{BacktestMetrics, BacktestSummary, ScoredPrediction, WindowPerformance};

/// Share of predictions a context factor must appear in to be reported.
pub const SIGNIFICANT_FACTOR_SHARE: f64 = 0.10;

/// Accuracy below which the model is flagged as worse than the reference.
pub const ACCURACY_FLOOR: f64 = 0.5;

/// Calibration error above which recalibration is recommended.
pub const ECE_CEILING: f64 = 0.10;

/// Reliability below which confidence is considered uninformative.
pub const RELIABILITY_FLOOR: f64 = 0.10;

/// Temporal consistency below which windows disagree too much.
pub const CONSISTENCY_FLOOR: f64 = 0.70;

/// Coverage below which data loss is flagged.
pub const COVERAGE_FLOOR: f64 = 0.80;

/// Derives best/worst window, reliability, consistency and recommendations.
pub struct SummaryGenerator;

impl SummaryGenerator {
    #[must_use]
    pub fn generate(
        predictions: &[ScoredPrediction],
        metrics: &BacktestMetrics,
        windows: &[WindowPerformance],
        coverage: f64,
    ) -> BacktestSummary {
        let (best_window, worst_window) = best_and_worst(windows);
        let significant_factors = significant_factors(predictions);
        let (model_reliability, reliability_warning) = reliability(predictions);
        let temporal_consistency = temporal_consistency(windows);

        let mut summary = BacktestSummary {
            best_window,
            worst_window,
            significant_factors,
            model_reliability,
            reliability_warning,
            temporal_consistency,
            recommendations: Vec::new(),
        };
        summary.recommendations = recommendations(metrics, &summary, coverage);
        summary
    }
}

/// Highest and lowest accuracy; ties go to the earlier window.
fn best_and_worst(
    windows: &[WindowPerformance],
) -> (Option<matchcast_core::WindowId>, Option<matchcast_core::WindowId>) {
    let mut best: Option<&WindowPerformance> = None;
    let mut worst: Option<&WindowPerformance> = None;
    for w in windows {
        if best.map_or(true, |b| w.accuracy > b.accuracy) {
            best = Some(w);
        }
        if worst.map_or(true, |b| w.accuracy < b.accuracy) {
            worst = Some(w);
        }
    }
    (best.map(|w| w.window), worst.map(|w| w.window))
}

fn significant_factors(predictions: &[ScoredPrediction]) -> BTreeSet<String> {
    if predictions.is_empty() {
        return BTreeSet::new();
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for p in predictions {
        if let Some(found) = &p.prediction().context_factors {
            for factor in found {
                *counts.entry(factor.as_str()).or_default() += 1;
            }
        }
    }
    let total = predictions.len() as f64;
    counts
        .into_iter()
        .filter(|(_, n)| *n as f64 / total >= SIGNIFICANT_FACTOR_SHARE)
        .map(|(factor, _)| factor.to_string())
        .collect()
}

/// Correlation of confidence with correctness, floored at 0.
fn reliability(predictions: &[ScoredPrediction]) -> (f64, Option<String>) {
    let confidence: Vec<f64> = predictions.iter().map(ScoredPrediction::confidence).collect();
    let correct: Vec<f64> = predictions
        .iter()
        .map(|p| if p.is_correct() { 1.0 } else { 0.0 })
        .collect();

    match pearson_correlation(&confidence, &correct) {
        Some(r) if r < 0.0 => (
            0.0,
            Some(format!(
                "confidence is negatively correlated with correctness (r = {r:.3})"
            )),
        ),
        Some(r) => (r, None),
        None => (0.0, None),
    }
}

/// `max(0, 1 - 2 * stddev(window accuracies))`.
fn temporal_consistency(windows: &[WindowPerformance]) -> f64 {
    if windows.is_empty() {
        return 0.0;
    }
    let accuracies: Vec<f64> = windows.iter().map(|w| w.accuracy).collect();
    (1.0 - 2.0 * population_std_dev(&accuracies)).max(0.0)
}

fn recommendations(metrics: &BacktestMetrics, summary: &BacktestSummary, coverage: f64) -> Vec<String> {
    let mut out = Vec::new();
    if metrics.total == 0 {
        out.push("no predictions were scored; check enrichment coverage and sufficiency rules".to_string());
        return out;
    }
    if metrics.accuracy < ACCURACY_FLOOR {
        out.push("below baseline, revise features".to_string());
    }
    if metrics.expected_calibration_error > ECE_CEILING {
        out.push(format!(
            "calibration error {:.3} exceeds {ECE_CEILING:.2}; recalibrate probabilities",
            metrics.expected_calibration_error
        ));
    }
    if summary.model_reliability < RELIABILITY_FLOOR {
        out.push("confidence does not track correctness; revisit the confidence model".to_string());
    }
    if summary.temporal_consistency < CONSISTENCY_FLOOR {
        out.push("performance varies strongly across windows; inspect late-arriving data".to_string());
    }
    if coverage < COVERAGE_FLOOR {
        out.push(format!(
            "coverage {:.0}% is low; enrichment data is missing for many matches",
            coverage * 100.0
        ));
    }
    if let (Some(best), Some(worst)) = (summary.best_window, summary.worst_window) {
        if best != worst {
            out.push(format!("prefer predictions issued at {best}; {worst} is weakest"));
        }
    }
    if metrics.financial.bets_placed >= 2 && metrics.financial.sharpe_ratio < 0.0 {
        out.push("reference staking loses money; do not stake on these predictions".to_string());
    }
    out
}
