//! Seeded bootstrap confidence intervals over paired per-prediction statistics.
//!
//! Scoring never draws random numbers; this estimator is the only consumer of
//! randomness and always runs from a fixed seed so comparisons reproduce.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use matchcast_core::stats::mean;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub n_iterations: usize,
    pub confidence_level: f64,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_iterations: 2_000,
            confidence_level: 0.95,
            seed: DEFAULT_SEED,
        }
    }
}

impl BootstrapConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, n_iterations: usize) -> Self {
        self.n_iterations = n_iterations;
        self
    }
}

/// Point estimate and percentile interval of a statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub point_estimate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub standard_error: f64,
}

impl BootstrapResult {
    fn degenerate() -> Self {
        Self {
            point_estimate: 0.0,
            ci_lower: 0.0,
            ci_upper: 0.0,
            standard_error: 0.0,
        }
    }

    /// Returns true if zero lies outside the interval.
    #[must_use]
    pub fn excludes_zero(&self) -> bool {
        self.ci_lower > 0.0 || self.ci_upper < 0.0
    }
}

/// Resamples values with replacement from a seeded ChaCha8 stream.
pub struct BootstrapResampler {
    config: BootstrapConfig,
}

impl BootstrapResampler {
    #[must_use]
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    /// Bootstrap interval of the mean of `values`.
    #[must_use]
    pub fn mean_ci(&self, values: &[f64]) -> BootstrapResult {
        if values.is_empty() || self.config.n_iterations == 0 {
            return BootstrapResult::degenerate();
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let n = values.len();
        let mut distribution: Vec<f64> = (0..self.config.n_iterations)
            .map(|_| {
                let total: f64 = (0..n).map(|_| values[rng.gen_range(0..n)]).sum();
                total / n as f64
            })
            .collect();
        distribution.sort_by(f64::total_cmp);

        let (ci_lower, ci_upper) = percentile_ci(&distribution, self.config.confidence_level);
        let centre = mean(&distribution);
        let variance = distribution.iter().map(|x| (x - centre).powi(2)).sum::<f64>()
            / (distribution.len() - 1).max(1) as f64;

        BootstrapResult {
            point_estimate: mean(values),
            ci_lower,
            ci_upper,
            standard_error: variance.sqrt(),
        }
    }
}

/// Percentile interval from a sorted distribution.
#[must_use]
pub fn percentile_ci(distribution: &[f64], confidence_level: f64) -> (f64, f64) {
    match distribution {
        [] => (0.0, 0.0),
        [only] => (*only, *only),
        _ => {
            let alpha = 1.0 - confidence_level;
            let n = distribution.len();
            let lower_idx = ((alpha / 2.0) * n as f64).floor() as usize;
            let upper_idx = (((1.0 - alpha / 2.0) * n as f64).ceil() as usize).saturating_sub(1);
            (
                distribution[lower_idx.min(n - 1)],
                distribution[upper_idx.min(n - 1)],
            )
        }
    }
}
