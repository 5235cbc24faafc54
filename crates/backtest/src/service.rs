//! Invocation surface: run, compare and overfitting check.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use matchcast_core::{
    AppConfig, BacktestConfig, BacktestError, BacktestResult, EvaluationPeriod, ModelKind,
    WindowId,
};

use crate::stores::{bounded_read, Stores};
use crate::temporal::{
    BacktestRunner, BootstrapConfig, ModelComparison, OverfittingReport, PeriodPlanner,
};

/// Entry point used by the CLI and by embedding services.
pub struct BacktestService {
    stores: Stores,
    app: AppConfig,
    cancel: Arc<AtomicBool>,
    comparison_template: BacktestConfig,
    planner: PeriodPlanner,
    bootstrap: BootstrapConfig,
}

impl BacktestService {
    #[must_use]
    pub fn new(stores: Stores, app: AppConfig) -> Self {
        Self {
            stores,
            app,
            cancel: Arc::new(AtomicBool::new(false)),
            comparison_template: BacktestConfig::new(ModelKind::Baseline, WindowId::T1)
                .with_windows(WindowId::ORDER),
            planner: PeriodPlanner::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }

    /// Windows, markets and filters applied to every model in [`Self::compare_models`].
    /// The template's model kind is ignored.
    #[must_use]
    pub fn with_comparison_template(mut self, template: BacktestConfig) -> Self {
        self.comparison_template = template;
        self
    }

    #[must_use]
    pub fn with_planner(mut self, planner: PeriodPlanner) -> Self {
        self.planner = planner;
        self
    }

    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Cancels every run started by this service once set. The flag is not reset.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.app
    }

    fn runner(&self) -> BacktestRunner {
        BacktestRunner::new(self.stores.clone(), self.app.clone())
            .with_cancel_flag(Arc::clone(&self.cancel))
    }

    /// Backtests `config` over `periods` and persists each period result.
    ///
    /// # Errors
    /// Returns [`BacktestError::ConfigValidation`] if the application config,
    /// the backtest config or the periods are invalid.
    pub async fn run(
        &self,
        periods: &[EvaluationPeriod],
        config: &BacktestConfig,
    ) -> Result<Vec<BacktestResult>, BacktestError> {
        self.app.validate()?;
        self.runner().run(periods, config).await
    }

    /// Runs each kind, plus the baseline, over the season's periods without
    /// persisting, and ranks them by Brier score.
    ///
    /// # Errors
    /// Fails if the season has no matches, the catalog cannot be read, or a
    /// run is rejected.
    pub async fn compare_models(
        &self,
        kinds: &[ModelKind],
        season_label: &str,
    ) -> Result<ModelComparison> {
        self.app.validate()?;
        let matches = bounded_read(
            "catalog",
            self.read_timeout(),
            self.stores.catalog.season_matches(season_label),
        )
        .await
        .with_context(|| format!("Failed to list matches of season {season_label}"))?;

        let periods = self.planner.plan(&matches);
        if periods.is_empty() {
            bail!("season {season_label} has no matches to compare on");
        }

        let mut kinds: BTreeSet<ModelKind> = kinds.iter().copied().collect();
        kinds.insert(ModelKind::Baseline);

        let mut runs = BTreeMap::new();
        for kind in kinds {
            let mut config = self.comparison_template.clone();
            config.model_kind = kind;
            info!(%kind, season = season_label, periods = periods.len(), "Comparing model");
            let results = self
                .runner()
                .without_persistence()
                .run(&periods, &config)
                .await
                .with_context(|| format!("Comparison run for {kind} failed"))?;
            runs.insert(kind, results);
        }

        Ok(ModelComparison::from_runs(
            season_label,
            periods,
            &runs,
            &self.app.staking,
            self.bootstrap.clone(),
        ))
    }

    /// Compares the earlier and later persisted periods of `kind`.
    ///
    /// # Errors
    /// Fails if the result store cannot be read or fewer than two periods
    /// were persisted.
    pub async fn check_overfitting(&self, kind: ModelKind) -> Result<OverfittingReport> {
        let results = bounded_read(
            "result",
            self.read_timeout(),
            self.stores.results.results_for_model(kind),
        )
        .await
        .with_context(|| format!("Failed to load persisted results for {kind}"))?;

        OverfittingReport::from_results(kind, &results, &self.app.staking)
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.app.runner.store_timeout_ms)
    }
}
