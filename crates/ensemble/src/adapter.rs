//! Nightly recomputation of per-window ensemble weights.
//!
//! The adapter never mutates a live table. Each retrain publishes a new
//! versioned snapshot per window through the [`WeightStore`]; readers pick the
//! snapshot effective at their own point in time.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use matchcast_core::{
    EnsembleConfig, ErrorHistoryStore, ModelErrorSample, ScoredPrediction, WeightSnapshot,
    WeightStore, WindowId,
};

use crate::weighting::inverse_error_weights;

/// Lifecycle of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterState {
    Stable,
    RetrainTriggered,
    Recomputing,
}

/// What one retrain did.
#[derive(Debug, Clone, Serialize)]
pub struct RetrainReport {
    pub started_at: DateTime<Utc>,
    /// Snapshots published in this retrain.
    pub published: BTreeMap<WindowId, WeightSnapshot>,
    /// Windows left on their current table, with the reason.
    pub skipped: BTreeMap<WindowId, String>,
}

impl RetrainReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            published: BTreeMap::new(),
            skipped: BTreeMap::new(),
        }
    }
}

/// Recomputes weights from recent per-model errors and publishes them.
pub struct EnsembleWeightAdapter {
    weights: Arc<dyn WeightStore>,
    errors: Arc<dyn ErrorHistoryStore>,
    config: EnsembleConfig,
    state: Mutex<AdapterState>,
}

impl EnsembleWeightAdapter {
    #[must_use]
    pub fn new(
        weights: Arc<dyn WeightStore>,
        errors: Arc<dyn ErrorHistoryStore>,
        config: EnsembleConfig,
    ) -> Self {
        Self {
            weights,
            errors,
            config,
            state: Mutex::new(AdapterState::Stable),
        }
    }

    pub async fn state(&self) -> AdapterState {
        *self.state.lock().await
    }

    /// Runs one retrain as of `now`.
    ///
    /// A trigger that arrives while a retrain is in progress is ignored and
    /// returns `Ok(None)`. The adapter is back in `Stable` when this returns,
    /// whether or not the retrain succeeded.
    ///
    /// # Errors
    /// Returns an error if the error history cannot be read or a snapshot
    /// cannot be published. Windows published before the failure stay published.
    pub async fn retrain(&self, now: DateTime<Utc>) -> Result<Option<RetrainReport>> {
        {
            let mut state = self.state.lock().await;
            if *state != AdapterState::Stable {
                warn!(state = ?*state, "Retrain already in progress; ignoring trigger");
                return Ok(None);
            }
            *state = AdapterState::RetrainTriggered;
        }

        let outcome = self.recompute(now).await;
        *self.state.lock().await = AdapterState::Stable;
        outcome.map(Some)
    }

    async fn recompute(&self, now: DateTime<Utc>) -> Result<RetrainReport> {
        *self.state.lock().await = AdapterState::Recomputing;
        let since = now - Duration::days(self.config.lookback_days);
        let mut report = RetrainReport::new(now);

        for window in WindowId::ORDER {
            let samples = self
                .errors
                .recent_errors(window, since)
                .await
                .with_context(|| format!("Failed to read error history for {window}"))?;

            let Some(weights) = inverse_error_weights(
                &self.config.models,
                &samples,
                self.config.weight_floor,
                self.config.min_samples,
            ) else {
                debug!(%window, samples = samples.len(), "Not enough error history; keeping weights");
                report
                    .skipped
                    .insert(window, format!("{} samples below minimum", samples.len()));
                continue;
            };

            let snapshot = self
                .weights
                .publish(window, weights, now)
                .await
                .with_context(|| format!("Failed to publish weights for {window}"))?;
            info!(
                %window,
                version = snapshot.version,
                samples = samples.len(),
                "Published ensemble weights"
            );
            report.published.insert(window, snapshot);
        }

        Ok(report)
    }
}

/// Per-model absolute errors derived from scored ensemble predictions.
///
/// Each base model's raw probability in `per_model_contribution` is compared
/// with the realized outcome. Predictions without contributions are ignored.
#[must_use]
pub fn prediction_errors(
    predictions: &[ScoredPrediction],
    recorded_at: DateTime<Utc>,
) -> Vec<ModelErrorSample> {
    predictions
        .iter()
        .flat_map(|p| {
            p.prediction()
                .per_model_contribution
                .iter()
                .flatten()
                .map(move |(model_id, probability)| ModelErrorSample {
                    model_id: model_id.clone(),
                    window: p.window(),
                    absolute_error: (probability - p.outcome()).abs(),
                    recorded_at,
                })
        })
        .collect()
}

/// Appends [`prediction_errors`] to the error history; returns how many were written.
///
/// # Errors
/// Returns an error on the first failed write.
pub async fn record_prediction_errors(
    store: &dyn ErrorHistoryStore,
    predictions: &[ScoredPrediction],
    recorded_at: DateTime<Utc>,
) -> Result<usize> {
    let samples = prediction_errors(predictions, recorded_at);
    let written = samples.len();
    for sample in samples {
        store
            .record_error(sample)
            .await
            .context("Failed to record model error")?;
    }
    Ok(written)
}
