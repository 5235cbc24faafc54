//! Per-window performance along the refinement order.

use matchcast_core::stats::mean;
use matchcast_core::{ScoredPrediction, WindowId, WindowPerformance};

use super::metrics::brier_score;

/// Groups scored predictions by window.
pub struct WindowAggregator;

impl WindowAggregator {
    /// Performance of every window that produced at least one prediction,
    /// in the order T24, T6, T1, T30.
    ///
    /// `improvement_vs_previous` is the accuracy gain over the immediately
    /// preceding window in that order, and `None` when that window produced
    /// no predictions.
    #[must_use]
    pub fn aggregate(predictions: &[ScoredPrediction]) -> Vec<WindowPerformance> {
        let mut performances: Vec<WindowPerformance> = Vec::new();

        for window in WindowId::ORDER {
            let group: Vec<ScoredPrediction> = predictions
                .iter()
                .filter(|p| p.window() == window)
                .cloned()
                .collect();
            if group.is_empty() {
                continue;
            }

            let correct = group.iter().filter(|p| p.is_correct()).count();
            let accuracy = correct as f64 / group.len() as f64;
            let confidences: Vec<f64> = group.iter().map(ScoredPrediction::confidence).collect();

            let improvement_vs_previous = window.previous().and_then(|previous| {
                performances
                    .iter()
                    .find(|p| p.window == previous)
                    .map(|p| accuracy - p.accuracy)
            });

            performances.push(WindowPerformance {
                window,
                predictions: group.len(),
                accuracy,
                brier_score: brier_score(&group),
                avg_confidence: mean(&confidences),
                improvement_vs_previous,
            });
        }

        performances
    }
}
