//! End-to-end runs over in-memory stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use matchcast_backtest::{BacktestRunner, BacktestService, RunnerState, Stores};
use matchcast_core::{
    AppConfig, BacktestConfig, BacktestError, BacktestResult, ContextLayer, EnrichmentLayer,
    EvaluationPeriod, LayerPayload, LayerRecord, LineupLayer, MarketId, MatchRecord, MatchResult,
    MatchStatus, MatchweekRange, ModelKind, OddsLayer, PersistenceStatus, ReconstructionPolicy,
    ResultStore, WeatherLayer, WeightSnapshot, WindowId, WindowRequirement,
};
use matchcast_data::{Dataset, MemoryStore};

// =============================================================================
// Fixtures
// =============================================================================

fn season_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn period(index: i64) -> EvaluationPeriod {
    let start = season_start() + Duration::weeks(2 * index);
    EvaluationPeriod::new(
        start,
        start + Duration::weeks(2),
        "2023-24",
        MatchweekRange {
            first: 2 * index as u32 + 1,
            last: 2 * index as u32 + 2,
        },
    )
}

fn kickoff(day: i64) -> DateTime<Utc> {
    season_start() + Duration::days(day) + Duration::hours(15)
}

fn odds(over_2_5: Option<f64>) -> OddsLayer {
    OddsLayer {
        home: 1.9,
        draw: 3.6,
        away: 4.2,
        over_2_5,
    }
}

/// A finished match with every layer recorded two days before kickoff.
fn add_match(dataset: Dataset, id: &str, kickoff: DateTime<Utc>, score: (u8, u8)) -> Dataset {
    let known = kickoff - Duration::days(2);
    dataset
        .with_match(MatchRecord {
            match_id: id.to_string(),
            home_team: Some(format!("{id}-home")),
            away_team: Some(format!("{id}-away")),
            kickoff,
            season_label: "2023-24".to_string(),
            matchweek: 1,
        })
        .with_layer(LayerRecord::new(id, known, LayerPayload::Odds(odds(Some(1.0 / 0.9)))))
        .with_layer(LayerRecord::new(
            id,
            known,
            LayerPayload::Context(ContextLayer {
                home_rating: 1620.0,
                away_rating: 1540.0,
                home_expected_goals: 1.6,
                away_expected_goals: 1.1,
                home_table_position: 6,
                away_table_position: 12,
                league_size: 20,
                is_rivalry: false,
            }),
        ))
        .with_layer(LayerRecord::new(
            id,
            known,
            LayerPayload::Weather(WeatherLayer {
                temperature_c: 12.0,
                precipitation_mm: 0.0,
                wind_kph: 10.0,
            }),
        ))
        .with_layer(LayerRecord::new(
            id,
            known,
            LayerPayload::Lineups(LineupLayer {
                home_confirmed: true,
                away_confirmed: true,
                home_missing_starters: 0,
                away_missing_starters: 0,
            }),
        ))
        .with_result(MatchResult {
            match_id: id.to_string(),
            status: MatchStatus::Finished,
            home_goals: Some(score.0),
            away_goals: Some(score.1),
        })
}

fn two_match_dataset() -> Dataset {
    let dataset = add_match(Dataset::default(), "m1", kickoff(2), (2, 1));
    add_match(dataset, "m2", kickoff(5), (3, 1))
}

fn runner(store: Arc<MemoryStore>, app: AppConfig) -> BacktestRunner {
    BacktestRunner::new(Stores::shared(store), app)
}

/// Everything except run identity and timestamps.
fn assert_same_scoring(a: &BacktestResult, b: &BacktestResult) {
    assert_eq!(a.period, b.period);
    assert_eq!(a.config, b.config);
    assert_eq!(a.weight_versions, b.weight_versions);
    assert_eq!(a.predictions, b.predictions);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.windows, b.windows);
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.eligible, b.eligible);
    assert_eq!(a.exclusions, b.exclusions);
    assert!((a.coverage - b.coverage).abs() < f64::EPSILON);
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn baseline_half_probability_is_never_correct() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T1);

    let results = runner(store.clone(), AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.predictions.len(), 2);
    assert!(result.metrics.accuracy.abs() < f64::EPSILON);
    assert!((result.metrics.brier_score - 0.25).abs() < 1e-12);
    assert!((result.coverage - 1.0).abs() < f64::EPSILON);
    assert_eq!(result.persistence, PersistenceStatus::Persisted);
    assert_eq!(store.period_result_count().await, 1);
}

#[tokio::test]
async fn confident_correct_ensemble_scores_perfectly() {
    let dataset = two_match_dataset().with_weights(WeightSnapshot {
        window: WindowId::T1,
        version: 1,
        effective_from: season_start() - Duration::days(30),
        weights: BTreeMap::from([("odds_implied".to_string(), 1.0)]),
    });
    let store = Arc::new(MemoryStore::new(dataset));
    let config =
        BacktestConfig::new(ModelKind::Ensemble, WindowId::T1).with_markets([MarketId::Over25]);

    let results = runner(store, AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap();

    let result = &results[0];
    assert_eq!(result.predictions.len(), 2);
    assert!((result.metrics.accuracy - 1.0).abs() < f64::EPSILON);
    assert!((result.metrics.brier_score - 0.01).abs() < 1e-9);
    assert_eq!(result.weight_versions.get(&WindowId::T1), Some(&1));
    let contributions = result.predictions[0]
        .prediction()
        .per_model_contribution
        .as_ref()
        .unwrap();
    assert!(contributions.contains_key("odds_implied"));
}

#[tokio::test]
async fn late_lineups_exclude_early_window_only() {
    let k = kickoff(3);
    let dataset = Dataset::default()
        .with_match(MatchRecord {
            match_id: "m1".to_string(),
            home_team: Some("Home".to_string()),
            away_team: Some("Away".to_string()),
            kickoff: k,
            season_label: "2023-24".to_string(),
            matchweek: 1,
        })
        .with_layer(LayerRecord::new(
            "m1",
            k - Duration::minutes(45),
            LayerPayload::Lineups(LineupLayer {
                home_confirmed: true,
                away_confirmed: true,
                home_missing_starters: 1,
                away_missing_starters: 0,
            }),
        ))
        .with_result(MatchResult {
            match_id: "m1".to_string(),
            status: MatchStatus::Finished,
            home_goals: Some(1),
            away_goals: Some(0),
        });
    let store = Arc::new(MemoryStore::new(dataset));

    let mut app = AppConfig::default();
    app.reconstruction = ReconstructionPolicy::default()
        .with_requirement(WindowId::T6, WindowRequirement::all_of([EnrichmentLayer::Lineups]))
        .with_requirement(WindowId::T30, WindowRequirement::all_of([EnrichmentLayer::Lineups]));
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T6)
        .with_windows([WindowId::T6, WindowId::T30]);

    let results = runner(store, app).run(&[period(0)], &config).await.unwrap();

    let result = &results[0];
    assert!(result.coverage < 1.0);
    assert!((result.coverage - 0.5).abs() < f64::EPSILON);
    assert_eq!(result.exclusions.insufficient_data, 1);
    assert_eq!(result.predictions.len(), 1);
    assert_eq!(result.predictions[0].window(), WindowId::T30);
}

#[tokio::test]
async fn unfinished_matches_are_not_enumerated() {
    let dataset = two_match_dataset().with_match(MatchRecord {
        match_id: "postponed".to_string(),
        home_team: Some("A".to_string()),
        away_team: Some("B".to_string()),
        kickoff: kickoff(4),
        season_label: "2023-24".to_string(),
        matchweek: 1,
    });
    let store = Arc::new(MemoryStore::new(dataset));
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T1);

    let results = runner(store, AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap();
    assert_eq!(results[0].eligible, 2);
}

#[tokio::test]
async fn low_confidence_predictions_are_filtered_not_lost() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T1).with_min_confidence(0.9);

    let results = runner(store, AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap();
    let result = &results[0];
    assert!(result.predictions.is_empty());
    assert_eq!(result.exclusions.low_confidence, 2);
    assert_eq!(result.eligible, 0);
    assert!((result.coverage - 1.0).abs() < f64::EPSILON);
}

// =============================================================================
// Walk-forward discipline
// =============================================================================

#[tokio::test]
async fn earlier_period_is_unaffected_by_later_periods() {
    let dataset = add_match(two_match_dataset(), "m3", kickoff(16), (0, 0))
        .with_weights(WeightSnapshot {
            window: WindowId::T1,
            version: 1,
            effective_from: season_start() - Duration::days(30),
            weights: BTreeMap::from([("odds_implied".to_string(), 0.5), ("elo".to_string(), 0.5)]),
        })
        .with_weights(WeightSnapshot {
            window: WindowId::T1,
            version: 2,
            effective_from: period(1).start,
            weights: BTreeMap::from([("odds_implied".to_string(), 0.1), ("elo".to_string(), 0.9)]),
        });
    let config = BacktestConfig::new(ModelKind::Ensemble, WindowId::T1)
        .with_markets([MarketId::HomeWin, MarketId::AwayWin]);

    let both = runner(Arc::new(MemoryStore::new(dataset.clone())), AppConfig::default())
        .run(&[period(0), period(1)], &config)
        .await
        .unwrap();
    let first_only = runner(Arc::new(MemoryStore::new(dataset)), AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap();

    assert_eq!(both.len(), 2);
    assert_same_scoring(&both[0], &first_only[0]);
    assert_eq!(both[0].weight_versions.get(&WindowId::T1), Some(&1));
    assert_eq!(both[1].weight_versions.get(&WindowId::T1), Some(&2));
}

#[tokio::test]
async fn periods_are_processed_in_chronological_order() {
    let dataset = add_match(two_match_dataset(), "m3", kickoff(16), (0, 0));
    let store = Arc::new(MemoryStore::new(dataset));
    let config = BacktestConfig::new(ModelKind::Contextual, WindowId::T1);

    let results = runner(store, AppConfig::default())
        .run(&[period(1), period(0)], &config)
        .await
        .unwrap();
    assert!(results[0].period.start < results[1].period.start);
}

#[tokio::test]
async fn predictions_come_back_in_kickoff_order_under_concurrency() {
    let mut dataset = Dataset::default();
    for i in 0..12 {
        dataset = add_match(dataset, &format!("m{i:02}"), kickoff(12 - i), (1, 1));
    }
    let store = Arc::new(MemoryStore::new(dataset).with_read_latency(StdDuration::from_millis(2)));
    let mut app = AppConfig::default();
    app.runner.concurrency = 4;
    let config = BacktestConfig::new(ModelKind::Contextual, WindowId::T1)
        .with_markets([MarketId::HomeWin, MarketId::Draw]);

    let results = runner(store, app).run(&[period(0)], &config).await.unwrap();
    let predictions = &results[0].predictions;
    assert_eq!(predictions.len(), 24);
    for pair in predictions.windows(2) {
        assert!(pair[0].sort_key() <= pair[1].sort_key());
    }
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn invalid_config_fails_before_any_period() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T1).with_markets(Vec::<MarketId>::new());

    let err = runner(store.clone(), AppConfig::default())
        .run(&[period(0)], &config)
        .await
        .unwrap_err();
    assert!(matches!(err, BacktestError::ConfigValidation(_)));
    assert_eq!(store.period_result_count().await, 0);
}

#[tokio::test]
async fn slow_store_reads_become_timeout_exclusions() {
    let store =
        Arc::new(MemoryStore::new(two_match_dataset()).with_read_latency(StdDuration::from_millis(200)));
    let mut app = AppConfig::default();
    app.runner.store_timeout_ms = 20;
    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T1);

    let results = runner(store, app).run(&[period(0)], &config).await.unwrap();
    let result = &results[0];
    assert!(result.predictions.is_empty());
    assert_eq!(result.exclusions.store_timeouts, 2);
    assert!(result.coverage.abs() < f64::EPSILON);
}

#[tokio::test]
async fn cancelled_before_start_returns_nothing() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let mut runner = runner(store.clone(), AppConfig::default());
    runner.cancel_handle().store(true, Ordering::SeqCst);

    let results = runner
        .run(&[period(0)], &BacktestConfig::new(ModelKind::Baseline, WindowId::T1))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(runner.state(), RunnerState::Done);
    assert_eq!(store.period_result_count().await, 0);
}

/// Sets the cancel flag once the first period is persisted.
struct CancelAfterFirstWrite {
    inner: Arc<MemoryStore>,
    cancel: Arc<AtomicBool>,
}

#[async_trait]
impl ResultStore for CancelAfterFirstWrite {
    async fn append_period_result(&self, result: &BacktestResult) -> Result<()> {
        self.inner.append_period_result(result).await?;
        self.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn results_for_model(&self, model_kind: ModelKind) -> Result<Vec<BacktestResult>> {
        self.inner.results_for_model(model_kind).await
    }
}

#[tokio::test]
async fn cancellation_keeps_completed_periods() {
    let dataset = add_match(two_match_dataset(), "m3", kickoff(16), (0, 0));
    let store = Arc::new(MemoryStore::new(dataset));
    let cancel = Arc::new(AtomicBool::new(false));
    let mut stores = Stores::shared(store.clone());
    stores.results = Arc::new(CancelAfterFirstWrite {
        inner: store.clone(),
        cancel: cancel.clone(),
    });

    let results = BacktestRunner::new(stores, AppConfig::default())
        .with_cancel_flag(cancel)
        .run(
            &[period(0), period(1)],
            &BacktestConfig::new(ModelKind::Baseline, WindowId::T1),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].period, period(0));
    assert_eq!(store.period_result_count().await, 1);
}

/// Fails the first `failures` writes.
struct FlakyResults {
    inner: Arc<MemoryStore>,
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ResultStore for FlakyResults {
    async fn append_period_result(&self, result: &BacktestResult) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            bail!("connection reset");
        }
        self.inner.append_period_result(result).await
    }

    async fn results_for_model(&self, model_kind: ModelKind) -> Result<Vec<BacktestResult>> {
        self.inner.results_for_model(model_kind).await
    }
}

fn flaky_stores(store: &Arc<MemoryStore>, failures: usize) -> Stores {
    let mut stores = Stores::shared(store.clone());
    stores.results = Arc::new(FlakyResults {
        inner: store.clone(),
        failures,
        calls: AtomicUsize::new(0),
    });
    stores
}

#[tokio::test]
async fn failed_write_is_retried_once() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let results = BacktestRunner::new(flaky_stores(&store, 1), AppConfig::default())
        .run(&[period(0)], &BacktestConfig::new(ModelKind::Baseline, WindowId::T1))
        .await
        .unwrap();

    assert_eq!(results[0].persistence, PersistenceStatus::Persisted);
    assert_eq!(store.period_result_count().await, 1);
}

#[tokio::test]
async fn persistent_write_failure_does_not_abort_later_periods() {
    let dataset = add_match(two_match_dataset(), "m3", kickoff(16), (0, 0));
    let store = Arc::new(MemoryStore::new(dataset));
    // Both attempts for the first period fail; the second period succeeds.
    let results = BacktestRunner::new(flaky_stores(&store, 2), AppConfig::default())
        .run(
            &[period(0), period(1)],
            &BacktestConfig::new(ModelKind::Baseline, WindowId::T1),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].persistence, PersistenceStatus::Failed);
    assert_eq!(results[1].persistence, PersistenceStatus::Persisted);
    assert_eq!(store.period_result_count().await, 1);
}

// =============================================================================
// Service
// =============================================================================

#[tokio::test]
async fn rerunning_a_run_result_is_idempotent() {
    let store = Arc::new(MemoryStore::new(two_match_dataset()));
    let results = runner(store.clone(), AppConfig::default())
        .run(&[period(0)], &BacktestConfig::new(ModelKind::Baseline, WindowId::T1))
        .await
        .unwrap();

    store.append_period_result(&results[0]).await.unwrap();
    assert_eq!(store.period_result_count().await, 1);
}

#[tokio::test]
async fn compare_models_always_includes_baseline() {
    let store = Arc::new(MemoryStore::new(add_match(
        two_match_dataset(),
        "m3",
        kickoff(16),
        (2, 0),
    )));
    let service = BacktestService::new(Stores::shared(store.clone()), AppConfig::default())
        .with_comparison_template(BacktestConfig::new(ModelKind::Baseline, WindowId::T1));

    let comparison = service
        .compare_models(&[ModelKind::Contextual], "2023-24")
        .await
        .unwrap();

    assert_eq!(comparison.rankings.len(), 2);
    assert!(comparison.score(ModelKind::Baseline).is_some());
    // Comparison runs are read-only.
    assert_eq!(store.period_result_count().await, 0);
}

#[tokio::test]
async fn overfitting_check_reads_persisted_periods() {
    let dataset = add_match(two_match_dataset(), "m3", kickoff(16), (2, 0));
    let store = Arc::new(MemoryStore::new(dataset));
    let service = BacktestService::new(Stores::shared(store.clone()), AppConfig::default());
    let config = BacktestConfig::new(ModelKind::Contextual, WindowId::T1);

    assert!(service.check_overfitting(ModelKind::Contextual).await.is_err());

    service.run(&[period(0), period(1)], &config).await.unwrap();
    let report = service.check_overfitting(ModelKind::Contextual).await.unwrap();
    assert_eq!(report.in_sample_periods, 1);
    assert_eq!(report.out_of_sample_periods, 1);
}
