//! Core types, store traits, statistics and configuration for temporal
//! match-prediction backtesting.

pub mod config;
pub mod config_loader;
pub mod enrichment;
pub mod error;
pub mod results;
pub mod stats;
pub mod traits;
pub mod types;
pub mod window;

pub use config::{
    AppConfig, DatabaseConfig, EnsembleConfig, ReconstructionPolicy, RunnerConfig, StakingPolicy,
    WindowRequirement,
};
pub use config_loader::ConfigLoader;
pub use enrichment::{
    ContextLayer, EnrichmentLayer, LayerPayload, LayerRecord, LineupLayer, MatchRecord,
    MatchResult, MatchStatus, OddsLayer, WeatherLayer,
};
pub use error::BacktestError;
pub use results::{
    BacktestMetrics, BacktestResult, BacktestSummary, CalibrationBin, ExclusionCounts,
    FinancialMetrics, ModelErrorSample, PersistenceStatus, WeightSnapshot, WindowPerformance,
};
pub use stats::{binomial_test, pearson_correlation, wilson_ci, AccuracySignificance};
pub use traits::{
    EnrichmentStore, ErrorHistoryStore, MatchCatalog, OutcomeStore, ResultStore, WeightStore,
};
pub use types::{
    BacktestConfig, Classification, EvaluationPeriod, MarketId, MatchweekRange, ModelId,
    ModelKind, ProbabilisticPrediction, ScoredPrediction, DECISION_THRESHOLD,
};
pub use window::{freeze_instant, freeze_instant_for, WindowId};
