pub mod service;
pub mod stores;
pub mod temporal;

pub use matchcast_core::{freeze_instant, WindowId};
pub use service::BacktestService;
pub use stores::Stores;
pub use temporal::{
    BacktestRunner, MatchState, MetricsEngine, ModelAdapter, ModelComparison, OutcomeResolver,
    OverfittingReport, OverfittingRisk, PeriodPlanner, PointInTimeDataReconstructor,
    RunnerState, SummaryGenerator, WindowAggregator,
};
