use std::sync::Arc;

use matchcast_backtest::temporal::PeriodPlanner;
use matchcast_backtest::{BacktestService, Stores};
use matchcast_core::{
    AppConfig, BacktestConfig, MarketId, MatchCatalog, ModelKind, PersistenceStatus, WindowId,
};
use matchcast_data::{load_dataset, CsvStorage, MemoryStore};

const FIXTURE: &str = "tests/data/season.json";

fn fixture_service() -> (Arc<MemoryStore>, BacktestService) {
    let dataset = load_dataset(FIXTURE).expect("Failed to load test fixture");
    let store = Arc::new(MemoryStore::new(dataset));
    let service = BacktestService::new(Stores::shared(store.clone()), AppConfig::default())
        .with_planner(PeriodPlanner::new(4));
    (store, service)
}

#[tokio::test]
async fn test_fixture_season_backtest() {
    let (store, service) = fixture_service();
    let matches = store.season_matches("2023-24").await.unwrap();
    let periods = PeriodPlanner::new(4).plan(&matches);
    assert_eq!(periods.len(), 2);

    let config = BacktestConfig::new(ModelKind::Baseline, WindowId::T24)
        .with_windows(WindowId::ORDER)
        .with_markets([MarketId::HomeWin, MarketId::Over25]);
    let results = service.run(&periods, &config).await.expect("Backtest failed");

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.persistence == PersistenceStatus::Persisted));
    assert_eq!(store.period_result_count().await, 2);
    for result in &results {
        assert_eq!(result.windows.len(), 4);
        assert!(result.coverage > 0.0 && result.coverage <= 1.0);
    }

    let mut csv = Vec::new();
    CsvStorage::write_predictions_to(&mut csv, &results).unwrap();
    let rows = String::from_utf8(csv).unwrap().lines().count();
    let predictions: usize = results.iter().map(|r| r.predictions.len()).sum();
    assert_eq!(rows, predictions + 1);

    let report = service
        .check_overfitting(ModelKind::Baseline)
        .await
        .expect("Overfitting check failed");
    assert_eq!(report.in_sample_periods + report.out_of_sample_periods, 2);
}

#[tokio::test]
async fn test_fixture_comparison_ranks_every_model() {
    let (store, service) = fixture_service();

    let comparison = service
        .compare_models(&[ModelKind::Contextual], "2023-24")
        .await
        .expect("Comparison failed");

    assert_eq!(comparison.rankings.len(), 2);
    assert!(comparison.score(ModelKind::Baseline).is_some());
    assert!(comparison.score(ModelKind::Contextual).is_some());
    assert_eq!(store.period_result_count().await, 0);
}

#[tokio::test]
async fn test_unknown_season_is_rejected() {
    let (_store, service) = fixture_service();
    assert!(service
        .compare_models(&[ModelKind::Ensemble], "1999-00")
        .await
        .is_err());
}
