//! Inverse-error weighting with a floor.

use std::collections::BTreeMap;

use matchcast_core::{ModelErrorSample, ModelId};

/// Errors at or below this are treated as this value.
const MIN_ERROR: f64 = 1e-6;

/// Mean absolute error and sample count per registered model.
#[must_use]
pub fn error_profile(
    models: &[ModelId],
    samples: &[ModelErrorSample],
) -> BTreeMap<ModelId, (f64, usize)> {
    let mut totals: BTreeMap<ModelId, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        if !models.contains(&sample.model_id) {
            continue;
        }
        let entry = totals.entry(sample.model_id.clone()).or_default();
        entry.0 += sample.absolute_error;
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|(model, (sum, n))| (model, (sum / n as f64, n)))
        .collect()
}

/// New weights for `models` from their recent errors.
///
/// `w_i = floor + (1 - n * floor) * (1 / mae_i) / sum_j(1 / mae_j)`.
///
/// A model with fewer than `min_samples` samples is charged the largest error
/// among models that have enough. Returns `None` when no model has enough
/// samples, so the caller keeps the current table.
#[must_use]
pub fn inverse_error_weights(
    models: &[ModelId],
    samples: &[ModelErrorSample],
    floor: f64,
    min_samples: usize,
) -> Option<BTreeMap<ModelId, f64>> {
    if models.is_empty() {
        return None;
    }
    let profile = error_profile(models, samples);
    let penalty = profile
        .values()
        .filter(|(_, n)| *n >= min_samples.max(1))
        .map(|(mae, _)| *mae)
        .reduce(f64::max)?;

    let inverse: BTreeMap<&ModelId, f64> = models
        .iter()
        .map(|model| {
            let error = match profile.get(model) {
                Some((mae, n)) if *n >= min_samples.max(1) => *mae,
                _ => penalty,
            };
            (model, 1.0 / error.max(MIN_ERROR))
        })
        .collect();
    let total: f64 = inverse.values().sum();
    let spread = 1.0 - models.len() as f64 * floor;

    Some(
        inverse
            .into_iter()
            .map(|(model, inv)| (model.clone(), floor + spread * inv / total))
            .collect(),
    )
}
