//! Probabilistic and financial metrics over scored predictions.
//!
//! Predictions must already be in chronological order: the staking
//! simulation updates the bankroll sequentially.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use matchcast_core::stats::{mean, sample_std_dev};
use matchcast_core::{
    BacktestMetrics, CalibrationBin, FinancialMetrics, ScoredPrediction, StakingPolicy,
};

/// Probabilities are clamped to this range before taking logarithms.
pub const LOG_LOSS_EPSILON: f64 = 0.001;

/// Equal-width bins used for calibration.
pub const CALIBRATION_BINS: usize = 10;

/// Computes [`BacktestMetrics`] under a fixed staking policy.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    staking: StakingPolicy,
}

impl MetricsEngine {
    #[must_use]
    pub fn new(staking: StakingPolicy) -> Self {
        Self { staking }
    }

    /// Metrics of `predictions`; neutral defaults when the list is empty.
    #[must_use]
    pub fn compute(&self, predictions: &[ScoredPrediction]) -> BacktestMetrics {
        if predictions.is_empty() {
            return BacktestMetrics::empty(self.staking.starting_bankroll);
        }

        let total = predictions.len();
        let correct = predictions.iter().filter(|p| p.is_correct()).count();
        let confidences: Vec<f64> = predictions.iter().map(ScoredPrediction::confidence).collect();
        let (calibration, expected_calibration_error) = calibration(predictions);

        BacktestMetrics {
            total,
            correct,
            accuracy: correct as f64 / total as f64,
            brier_score: brier_score(predictions),
            log_loss: log_loss(predictions),
            expected_calibration_error,
            avg_confidence: mean(&confidences),
            calibration,
            financial: self.simulate_staking(predictions),
        }
    }

    /// Runs the reference staking policy over `predictions` in order.
    ///
    /// A bet is placed when confidence is strictly above the threshold. It
    /// backs the side the model favours at fair odds: `1/p` for the outcome
    /// when `p >= 0.5`, `1/(1-p)` against it otherwise. The stake is a fixed
    /// fraction of the current bankroll.
    #[must_use]
    pub fn simulate_staking(&self, predictions: &[ScoredPrediction]) -> FinancialMetrics {
        let start = self.staking.starting_bankroll;
        let mut bankroll = start;
        let mut peak = start;
        let mut max_drawdown = 0.0_f64;
        let mut total_staked = Decimal::ZERO;
        let mut returns = Vec::new();

        for prediction in predictions {
            if prediction.confidence() <= self.staking.confidence_threshold {
                continue;
            }
            let stake = bankroll * self.staking.stake_fraction;
            if stake <= Decimal::ZERO {
                continue;
            }

            let p = prediction.probability();
            let backs_outcome = p >= 0.5;
            let side_probability = if backs_outcome { p } else { 1.0 - p };
            let Some(odds) = Decimal::from_f64(1.0 / side_probability) else {
                continue;
            };

            let outcome = prediction.outcome();
            let settled = if backs_outcome { outcome } else { 1.0 - outcome };
            let profit = if settled > 0.5 {
                stake * (odds - Decimal::ONE)
            } else if settled < 0.5 {
                -stake
            } else {
                Decimal::ZERO
            };

            bankroll += profit;
            total_staked += stake;
            returns.push((profit / stake).to_f64().unwrap_or(0.0));

            if bankroll > peak {
                peak = bankroll;
            } else if peak > Decimal::ZERO {
                let drawdown = ((peak - bankroll) / peak).to_f64().unwrap_or(0.0);
                max_drawdown = max_drawdown.max(drawdown);
            }
        }

        let net_profit = bankroll - start;
        let roi = if total_staked > Decimal::ZERO {
            (net_profit / total_staked).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let sharpe_ratio = if returns.len() < 2 {
            0.0
        } else {
            let std = sample_std_dev(&returns);
            if std > f64::EPSILON {
                mean(&returns) / std
            } else {
                0.0
            }
        };

        FinancialMetrics {
            starting_bankroll: start,
            final_bankroll: bankroll,
            peak_bankroll: peak,
            bets_placed: returns.len(),
            total_staked,
            net_profit,
            roi,
            sharpe_ratio,
            max_drawdown,
        }
    }
}

/// Mean squared error of probability against outcome; 0 for an empty list.
#[must_use]
pub fn brier_score(predictions: &[ScoredPrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .map(|p| (p.probability() - p.outcome()).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

/// Mean binary cross-entropy with `p` clamped to `[0.001, 0.999]`.
#[must_use]
pub fn log_loss(predictions: &[ScoredPrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .map(|pred| {
            let p = pred.probability().clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            let y = pred.outcome();
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / predictions.len() as f64
}

/// Calibration bins and the expected calibration error.
///
/// Bin `i` covers `[i/10, (i+1)/10)`; probability 1.0 falls in the last bin.
#[must_use]
pub fn calibration(predictions: &[ScoredPrediction]) -> (Vec<CalibrationBin>, f64) {
    if predictions.is_empty() {
        return (Vec::new(), 0.0);
    }

    let mut sums = [(0usize, 0.0_f64, 0.0_f64); CALIBRATION_BINS];
    for p in predictions {
        let index = ((p.probability() * CALIBRATION_BINS as f64).floor() as usize)
            .min(CALIBRATION_BINS - 1);
        let entry = &mut sums[index];
        entry.0 += 1;
        entry.1 += p.probability();
        entry.2 += p.outcome();
    }

    let total = predictions.len() as f64;
    let width = 1.0 / CALIBRATION_BINS as f64;
    let mut bins = Vec::new();
    let mut ece = 0.0;
    for (i, (count, predicted, actual)) in sums.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let n = *count as f64;
        let mean_predicted = predicted / n;
        let mean_actual = actual / n;
        ece += (n / total) * (mean_predicted - mean_actual).abs();
        bins.push(CalibrationBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count: *count,
            mean_predicted,
            mean_actual,
        });
    }
    (bins, ece)
}
