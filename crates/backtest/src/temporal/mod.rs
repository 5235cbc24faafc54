//! Temporal backtesting of match predictions.
//!
//! This module reconstructs match state at each window's freeze instant,
//! predicts with a model adapter, settles against realized outcomes and scores
//! the result period by period.

pub mod bootstrap;
pub mod comparison;
pub mod metrics;
pub mod models;
pub mod outcome;
pub mod overfitting;
pub mod planner;
pub mod reconstructor;
pub mod runner;
pub mod strategies;
pub mod summary;
pub mod windows;

pub use bootstrap::{BootstrapConfig, BootstrapResampler, BootstrapResult};
pub use comparison::{ModelComparison, ModelScore};
pub use metrics::{brier_score, calibration, log_loss, MetricsEngine};
pub use models::{BaselineModel, ContextualModel, EnsembleModel, ModelAdapter};
pub use outcome::{outcome_for, OutcomeResolver};
pub use overfitting::{
    OverfittingReport, OverfittingRisk, PerformanceDegradation, SignificanceTest,
};
pub use planner::PeriodPlanner;
pub use reconstructor::{MatchState, PointInTimeDataReconstructor, Sufficiency};
pub use runner::{BacktestRunner, RunnerState};
pub use strategies::BaseStrategy;
pub use summary::SummaryGenerator;
pub use windows::WindowAggregator;
