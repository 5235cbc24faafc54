//! Statistical helpers for scoring and comparing prediction strategies.
//!
//! Provides confidence intervals, a binomial significance test, Pearson
//! correlation and the dispersion estimators used by the metrics engine and
//! summary generator.

use serde::{Deserialize, Serialize};

/// Significance of an observed accuracy against a reference rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySignificance {
    /// Observed accuracy.
    pub accuracy: f64,
    /// Reference rate tested against (e.g. the baseline's accuracy).
    pub reference: f64,
    /// Wilson score 95% CI lower bound.
    pub wilson_ci_lower: f64,
    /// Wilson score 95% CI upper bound.
    pub wilson_ci_upper: f64,
    /// Two-tailed p-value (H0: accuracy = reference).
    pub p_value: f64,
    /// Number of predictions.
    pub sample_size: usize,
    /// p-value below 0.05.
    pub is_significant: bool,
}

impl AccuracySignificance {
    /// Tests `correct` out of `total` against `reference`.
    #[must_use]
    pub fn from_counts(correct: usize, total: usize, reference: f64) -> Self {
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        let (wilson_ci_lower, wilson_ci_upper) = wilson_ci(correct, total, 1.96);
        let p_value = binomial_test(correct, total, reference.clamp(0.0, 1.0));

        Self {
            accuracy,
            reference,
            wilson_ci_lower,
            wilson_ci_upper,
            p_value,
            sample_size: total,
            is_significant: p_value < 0.05,
        }
    }

    /// Lower CI bound sits above the reference rate.
    #[must_use]
    pub fn beats_reference(&self) -> bool {
        self.wilson_ci_lower > self.reference
    }
}

/// Wilson score confidence interval for a proportion.
///
/// ```text
/// CI = (p + z²/2n ± z·sqrt(p(1−p)/n + z²/4n²)) / (1 + z²/n)
/// ```
///
/// # Examples
/// ```
/// use matchcast_core::stats::wilson_ci;
///
/// let (lower, upper) = wilson_ci(50, 100, 1.96);
/// assert!(lower > 0.39 && lower < 0.41);
/// assert!(upper > 0.59 && upper < 0.61);
/// ```
#[must_use]
pub fn wilson_ci(successes: usize, n: usize, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }

    let n_f = n as f64;
    let p = successes as f64 / n_f;
    let z_sq = z * z;

    let denominator = 1.0 + z_sq / n_f;
    let center = p + z_sq / (2.0 * n_f);
    let spread = z * (p * (1.0 - p) / n_f + z_sq / (4.0 * n_f * n_f)).sqrt();

    let lower = (center - spread) / denominator;
    let upper = (center + spread) / denominator;

    (lower.max(0.0), upper.min(1.0))
}

/// Two-tailed binomial test of `successes` out of `n` against `p0`.
///
/// Normal approximation with continuity correction.
///
/// # Examples
/// ```
/// use matchcast_core::stats::binomial_test;
///
/// assert!(binomial_test(55, 100, 0.5) > 0.05);
/// assert!(binomial_test(65, 100, 0.5) < 0.05);
/// ```
#[must_use]
pub fn binomial_test(successes: usize, n: usize, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }

    let n_f = n as f64;
    let k = successes as f64;
    let expected = n_f * p0;
    let std_dev = (n_f * p0 * (1.0 - p0)).sqrt();

    if std_dev < f64::EPSILON {
        if (p0 < f64::EPSILON && successes == 0) || (p0 > 1.0 - f64::EPSILON && successes == n) {
            return 1.0;
        }
        return 0.0;
    }

    let z = (k - expected).abs() - 0.5;
    if z < 0.0 {
        return 1.0;
    }

    2.0 * (1.0 - standard_normal_cdf(z / std_dev))
}

/// Abramowitz and Stegun 26.2.17 approximation of the standard normal CDF.
fn standard_normal_cdf(x: f64) -> f64 {
    if x < 0.0 {
        return 1.0 - standard_normal_cdf(-x);
    }

    let b1 = 0.319_381_530;
    let b2 = -0.356_563_782;
    let b3 = 1.781_477_937;
    let b4 = -1.821_255_978;
    let b5 = 1.330_274_429;
    let p = 0.231_641_9;

    let t = 1.0 / (1.0 + p * x);
    let poly = t * (b1 + t * (b2 + t * (b3 + t * (b4 + t * b5))));
    let pdf = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - pdf * poly
}

/// Pearson correlation of two equally long series.
///
/// Returns `None` for mismatched lengths, fewer than two points, or a
/// constant series (undefined correlation).
#[must_use]
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator < f64::EPSILON {
        return None;
    }
    Some((covariance / denominator).clamp(-1.0, 1.0))
}

/// Arithmetic mean, 0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0 for an empty slice.
#[must_use]
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sample standard deviation (n − 1), 0 with fewer than two values.
#[must_use]
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // wilson_ci
    // ============================================

    #[test]
    fn wilson_ci_50_percent_approximately_40_60() {
        let (lower, upper) = wilson_ci(50, 100, 1.96);
        assert!(lower > 0.39 && lower < 0.42, "lower was {lower}");
        assert!(upper > 0.58 && upper < 0.61, "upper was {upper}");
    }

    #[test]
    fn wilson_ci_zero_samples() {
        let (lower, upper) = wilson_ci(0, 0, 1.96);
        assert!(lower.abs() < f64::EPSILON);
        assert!(upper.abs() < f64::EPSILON);
    }

    #[test]
    fn wilson_ci_all_correct_stays_within_unit_interval() {
        let (lower, upper) = wilson_ci(10, 10, 1.96);
        assert!(lower > 0.65, "lower was {lower}");
        assert!((upper - 1.0).abs() < 0.01, "upper was {upper}");
    }

    // ============================================
    // binomial_test
    // ============================================

    #[test]
    fn binomial_test_50_of_100_not_significant() {
        let p = binomial_test(50, 100, 0.5);
        assert!(p > 0.9, "p-value was {p}");
    }

    #[test]
    fn binomial_test_35_of_100_significant() {
        let p = binomial_test(35, 100, 0.5);
        assert!(p < 0.05, "p-value was {p}");
    }

    #[test]
    fn binomial_test_against_baseline_rate() {
        // 62 correct out of 100 against a 0.45 baseline
        let p = binomial_test(62, 100, 0.45);
        assert!(p < 0.01, "p-value was {p}");
    }

    #[test]
    fn binomial_test_zero_samples() {
        assert!((binomial_test(0, 0, 0.5) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn binomial_test_degenerate_reference() {
        assert!((binomial_test(0, 10, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!(binomial_test(3, 10, 0.0).abs() < f64::EPSILON);
    }

    // ============================================
    // pearson_correlation
    // ============================================

    #[test]
    fn pearson_perfect_positive() {
        let r = pearson_correlation(&[0.1, 0.2, 0.3, 0.4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(r > 0.99, "r was {r}");
    }

    #[test]
    fn pearson_perfect_negative() {
        let r = pearson_correlation(&[0.1, 0.2, 0.3, 0.4], &[4.0, 3.0, 2.0, 1.0]).unwrap();
        assert!(r < -0.99, "r was {r}");
    }

    #[test]
    fn pearson_undefined_for_constant_series() {
        assert!(pearson_correlation(&[0.5, 0.5, 0.5], &[1.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn pearson_undefined_for_short_or_mismatched_input() {
        assert!(pearson_correlation(&[0.5], &[1.0]).is_none());
        assert!(pearson_correlation(&[0.5, 0.6], &[1.0]).is_none());
    }

    // ============================================
    // Dispersion
    // ============================================

    #[test]
    fn population_and_sample_std_dev_differ_by_bessel_correction() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std_dev(&values) - 2.0).abs() < 1e-12);
        let expected_sample = (32.0_f64 / 7.0).sqrt();
        assert!((sample_std_dev(&values) - expected_sample).abs() < 1e-12);
    }

    #[test]
    fn dispersion_of_tiny_inputs_is_zero() {
        assert!(mean(&[]).abs() < f64::EPSILON);
        assert!(population_std_dev(&[]).abs() < f64::EPSILON);
        assert!(sample_std_dev(&[3.0]).abs() < f64::EPSILON);
    }

    // ============================================
    // AccuracySignificance
    // ============================================

    #[test]
    fn significance_from_counts_calculates_correctly() {
        let sig = AccuracySignificance::from_counts(65, 100, 0.5);
        assert!((sig.accuracy - 0.65).abs() < 0.001);
        assert!(sig.is_significant);
        assert!(sig.beats_reference());
        assert_eq!(sig.sample_size, 100);
    }

    #[test]
    fn significance_55_percent_not_significant() {
        let sig = AccuracySignificance::from_counts(55, 100, 0.5);
        assert!(!sig.is_significant);
        assert!(!sig.beats_reference());
    }
}
