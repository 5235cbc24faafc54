//! Walk-forward backtest runner.
//!
//! Periods run strictly one after another. Within a period, matches are
//! simulated on a bounded worker pool and the scored predictions are sorted
//! back into kickoff order before any metric is computed. The only state a
//! period reads that another period could have produced is the weight
//! snapshot effective at its own start.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use matchcast_core::{
    freeze_instant, AppConfig, BacktestConfig, BacktestError, BacktestResult, EvaluationPeriod,
    ExclusionCounts, MatchRecord, MatchResult, ModelKind, PersistenceStatus, ScoredPrediction,
    WeightSnapshot, WindowId,
};

use crate::stores::{bounded_read, Stores};

use super::metrics::MetricsEngine;
use super::models::ModelAdapter;
use super::outcome::{outcome_for, OutcomeResolver};
use super::reconstructor::PointInTimeDataReconstructor;
use super::summary::SummaryGenerator;
use super::windows::WindowAggregator;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    PeriodSelected,
    MatchesEnumerated,
    Simulating,
    PeriodScored,
    Done,
}

/// Drives one backtest run over a list of periods.
pub struct BacktestRunner {
    stores: Stores,
    app: AppConfig,
    cancel: Arc<AtomicBool>,
    persist: bool,
    state: RunnerState,
}

impl BacktestRunner {
    /// Creates a runner that persists every completed period.
    #[must_use]
    pub fn new(stores: Stores, app: AppConfig) -> Self {
        Self {
            stores,
            app,
            cancel: Arc::new(AtomicBool::new(false)),
            persist: true,
            state: RunnerState::Idle,
        }
    }

    /// Shares an external cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Skips the result store; results are marked [`PersistenceStatus::Skipped`].
    #[must_use]
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Setting the returned flag cancels the run at the next period or match boundary.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn transition(&mut self, next: RunnerState) {
        debug!(from = ?self.state, to = ?next, "Runner state change");
        self.state = next;
    }

    fn check_cancelled(&self) -> Result<(), BacktestError> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(BacktestError::Cancelled { at: Utc::now() });
        }
        Ok(())
    }

    /// Runs `config` over `periods` in chronological order.
    ///
    /// On cancellation the period in flight is discarded and the results of
    /// every completed period are returned.
    ///
    /// # Errors
    /// Returns [`BacktestError::ConfigValidation`] before any period is
    /// processed if the config or the periods are invalid.
    pub async fn run(
        &mut self,
        periods: &[EvaluationPeriod],
        config: &BacktestConfig,
    ) -> Result<Vec<BacktestResult>, BacktestError> {
        config.validate()?;
        let periods = validate_periods(periods)?;

        let run_id = Uuid::new_v4();
        let recorded_at = Utc::now();
        info!(
            %run_id,
            config = %config.key(),
            periods = periods.len(),
            "Starting backtest run"
        );

        let mut results = Vec::with_capacity(periods.len());
        for period in &periods {
            match self.run_period(period, config, run_id, recorded_at).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(BacktestError::Cancelled { at }) => {
                    warn!(
                        %run_id,
                        period = %period.key(),
                        %at,
                        completed = results.len(),
                        "Backtest cancelled; discarding period in flight"
                    );
                    break;
                }
                Err(e) => {
                    self.transition(RunnerState::Done);
                    return Err(e);
                }
            }
        }

        self.transition(RunnerState::Done);
        info!(%run_id, completed = results.len(), "Backtest run finished");
        Ok(results)
    }

    /// Processes one period; `Ok(None)` means the period was skipped.
    async fn run_period(
        &mut self,
        period: &EvaluationPeriod,
        config: &BacktestConfig,
        run_id: Uuid,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<BacktestResult>, BacktestError> {
        self.check_cancelled()?;
        self.transition(RunnerState::PeriodSelected);
        info!(period = %period.key(), "Backtesting period");

        let timeout = self.read_timeout();
        let matches = match bounded_read(
            "catalog",
            timeout,
            self.stores.catalog.finished_matches(period.start, period.end),
        )
        .await
        {
            Ok(matches) => matches,
            Err(e) => {
                error!(period = %period.key(), error = %e, "Failed to enumerate matches; skipping period");
                return Ok(None);
            }
        };
        let matches = select_matches(matches, period, config.max_matches);
        self.transition(RunnerState::MatchesEnumerated);

        let snapshots = match self.frozen_snapshots(period, config).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!(period = %period.key(), error = %e, "Failed to read weight snapshots; skipping period");
                return Ok(None);
            }
        };
        let weight_versions: BTreeMap<WindowId, u64> =
            snapshots.iter().map(|(w, s)| (*w, s.version)).collect();

        let simulator = MatchSimulator {
            reconstructor: PointInTimeDataReconstructor::new(
                Arc::clone(&self.stores.catalog),
                Arc::clone(&self.stores.enrichment),
                self.app.reconstruction.clone(),
                timeout,
            ),
            adapter: Arc::new(ModelAdapter::for_kind(config.model_kind, snapshots)),
            resolver: OutcomeResolver::new(Arc::clone(&self.stores.outcomes), timeout),
            config: Arc::new(config.clone()),
            cancel: Arc::clone(&self.cancel),
        };

        self.transition(RunnerState::Simulating);
        let outcomes: Vec<Option<MatchOutcome>> = stream::iter(matches)
            .map(|record| {
                let simulator = simulator.clone();
                async move { simulator.simulate(record).await }
            })
            .buffer_unordered(self.app.runner.concurrency.max(1))
            .collect()
            .await;

        // A cancelled worker returns None; the flag is still set.
        self.check_cancelled()?;

        let mut predictions = Vec::new();
        let mut eligible = 0;
        let mut exclusions = ExclusionCounts::default();
        for outcome in outcomes.into_iter().flatten() {
            predictions.extend(outcome.predictions);
            eligible += outcome.eligible;
            exclusions.merge(&outcome.exclusions);
        }
        predictions.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut result = self.score_period(
            period,
            config,
            run_id,
            recorded_at,
            weight_versions,
            predictions,
            eligible,
            exclusions,
        );
        self.transition(RunnerState::PeriodScored);

        if self.persist {
            result.persistence = self.persist_with_retry(&result).await;
        }
        Ok(Some(result))
    }

    #[allow(clippy::too_many_arguments)]
    fn score_period(
        &self,
        period: &EvaluationPeriod,
        config: &BacktestConfig,
        run_id: Uuid,
        recorded_at: DateTime<Utc>,
        weight_versions: BTreeMap<WindowId, u64>,
        predictions: Vec<ScoredPrediction>,
        eligible: usize,
        exclusions: ExclusionCounts,
    ) -> BacktestResult {
        let metrics = MetricsEngine::new(self.app.staking.clone()).compute(&predictions);
        let windows = WindowAggregator::aggregate(&predictions);
        let coverage = if eligible == 0 {
            1.0
        } else {
            predictions.len() as f64 / eligible as f64
        };
        let summary = SummaryGenerator::generate(&predictions, &metrics, &windows, coverage);

        info!(
            period = %period.key(),
            scored = predictions.len(),
            eligible,
            coverage,
            accuracy = metrics.accuracy,
            brier = metrics.brier_score,
            "Period scored"
        );
        if exclusions.data_losses() > 0 {
            debug!(period = %period.key(), ?exclusions, "Units excluded");
        }

        BacktestResult {
            run_id,
            recorded_at,
            period: period.clone(),
            config: config.clone(),
            weight_versions,
            predictions,
            metrics,
            windows,
            summary,
            eligible,
            coverage,
            exclusions,
            persistence: PersistenceStatus::Skipped,
        }
    }

    /// Weight snapshots effective at the period start, one per window.
    async fn frozen_snapshots(
        &self,
        period: &EvaluationPeriod,
        config: &BacktestConfig,
    ) -> Result<BTreeMap<WindowId, WeightSnapshot>, BacktestError> {
        let mut snapshots = BTreeMap::new();
        if config.model_kind != ModelKind::Ensemble {
            return Ok(snapshots);
        }
        for window in config.windows_in_order() {
            let found = bounded_read(
                "weight",
                self.read_timeout(),
                self.stores.weights.get_snapshot(window, period.start),
            )
            .await?;
            let snapshot = found.unwrap_or_else(|| {
                debug!(%window, "No published weights; using equal weights");
                WeightSnapshot::equal(window, &self.app.ensemble.models, period.start)
            });
            snapshots.insert(window, snapshot);
        }
        Ok(snapshots)
    }

    async fn persist_with_retry(&self, result: &BacktestResult) -> PersistenceStatus {
        let mut stored = result.clone();
        stored.persistence = PersistenceStatus::Persisted;

        let attempts = self.app.runner.persist_retries + 1;
        for attempt in 1..=attempts {
            match bounded_read(
                "result",
                self.read_timeout(),
                self.stores.results.append_period_result(&stored),
            )
            .await
            {
                Ok(()) => return PersistenceStatus::Persisted,
                Err(e) if attempt < attempts => {
                    warn!(period = %result.period.key(), attempt, error = %e, "Result write failed; retrying");
                }
                Err(e) => {
                    error!(period = %result.period.key(), attempt, error = %e, "Result write failed; period recorded as failed");
                }
            }
        }
        PersistenceStatus::Failed
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.app.runner.store_timeout_ms)
    }
}

/// Sorts, de-duplicates and validates periods.
fn validate_periods(periods: &[EvaluationPeriod]) -> Result<Vec<EvaluationPeriod>, BacktestError> {
    if periods.is_empty() {
        return Err(BacktestError::ConfigValidation(
            "at least one period is required".to_string(),
        ));
    }
    let mut sorted = periods.to_vec();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    for period in &sorted {
        if period.start >= period.end {
            return Err(BacktestError::ConfigValidation(format!(
                "period {} is empty: start must precede end",
                period.key()
            )));
        }
    }
    for pair in sorted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(BacktestError::ConfigValidation(format!(
                "periods {} and {} overlap",
                pair[0].key(),
                pair[1].key()
            )));
        }
    }
    Ok(sorted)
}

/// Matches inside the period, by kickoff, capped at `max_matches`.
fn select_matches(
    mut matches: Vec<MatchRecord>,
    period: &EvaluationPeriod,
    max_matches: Option<usize>,
) -> Vec<MatchRecord> {
    matches.retain(|m| period.contains(m.kickoff));
    matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.match_id.cmp(&b.match_id)));
    if let Some(max) = max_matches {
        matches.truncate(max);
    }
    matches
}

/// What one match contributed to its period.
#[derive(Debug, Default)]
struct MatchOutcome {
    predictions: Vec<ScoredPrediction>,
    eligible: usize,
    exclusions: ExclusionCounts,
}

impl MatchOutcome {
    fn exclude(&mut self, match_id: &str, window: WindowId, error: &BacktestError, units: usize) {
        if matches!(error, BacktestError::ExternalStoreTimeout { .. }) {
            warn!(match_id, %window, error = %error, "Store timeout; excluding");
        } else {
            debug!(match_id, %window, error = %error, "Excluding");
        }
        self.eligible += units;
        self.exclusions.record(error, units);
    }
}

/// Per-match pipeline shared by the worker pool.
#[derive(Clone)]
struct MatchSimulator {
    reconstructor: PointInTimeDataReconstructor,
    adapter: Arc<ModelAdapter>,
    resolver: OutcomeResolver,
    config: Arc<BacktestConfig>,
    cancel: Arc<AtomicBool>,
}

impl MatchSimulator {
    /// Scores every window and market of one match; `None` if cancelled.
    async fn simulate(&self, record: MatchRecord) -> Option<MatchOutcome> {
        if self.cancel.load(Ordering::SeqCst) {
            return None;
        }

        let mut outcome = MatchOutcome::default();
        let mut settled: Option<Result<Option<MatchResult>, BacktestError>> = None;
        let markets = &self.config.markets;

        for window in self.config.windows_in_order() {
            let freeze = freeze_instant(record.kickoff, window);
            let state = match self
                .reconstructor
                .reconstruct(&record.match_id, freeze, window)
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    outcome.exclude(&record.match_id, window, &e, markets.len());
                    continue;
                }
            };

            for &market in markets {
                let prediction = match self.adapter.predict(&state, market) {
                    Ok(prediction) => prediction,
                    Err(e) => {
                        outcome.exclude(&record.match_id, window, &e, 1);
                        continue;
                    }
                };

                if let Some(min) = self.config.min_confidence {
                    if prediction.confidence < min {
                        outcome.exclusions.low_confidence += 1;
                        continue;
                    }
                }

                if settled.is_none() {
                    settled = Some(self.resolver.fetch(&record.match_id).await);
                }
                let realized = match settled.as_ref() {
                    Some(Ok(Some(result))) => outcome_for(result, market),
                    Some(Err(e)) => {
                        outcome.exclude(&record.match_id, window, e, 1);
                        continue;
                    }
                    Some(Ok(None)) | None => None,
                };
                let Some(realized) = realized else {
                    let unavailable = BacktestError::OutcomeUnavailable {
                        match_id: record.match_id.clone(),
                        market,
                    };
                    outcome.exclude(&record.match_id, window, &unavailable, 1);
                    continue;
                };

                outcome.eligible += 1;
                outcome.predictions.push(ScoredPrediction::score(
                    record.match_id.clone(),
                    record.kickoff,
                    window,
                    market,
                    prediction,
                    realized,
                ));
            }
        }

        Some(outcome)
    }
}
