use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use matchcast_backtest::temporal::PeriodPlanner;
use matchcast_backtest::BacktestService;
use matchcast_core::{AppConfig, BacktestConfig, ConfigLoader, MarketId, ModelKind, WindowId};
use matchcast_data::CsvStorage;
use matchcast_ensemble::{record_prediction_errors, EnsembleWeightAdapter, WeightRetrainScheduler};

mod backend;
mod report;

use backend::Backend;
use report::ReportFormatter;

#[derive(Parser)]
#[command(name = "matchcast")]
#[command(about = "Temporal walk-forward backtesting of match predictions", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,
    /// Config profile overlay (config/Config.<profile>.toml); replaces --config
    #[arg(long, global = true, env = "MATCHCAST_PROFILE")]
    profile: Option<String>,
    /// JSON fixture to run against in memory instead of the database
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one model over a season's periods and persist each period
    Backtest {
        /// Model kind (ensemble, contextual, baseline)
        #[arg(short, long, default_value = "ensemble")]
        model: ModelKind,
        /// Season label, e.g. 2023-24
        #[arg(short, long)]
        season: String,
        /// Windows to evaluate, comma-separated (T24, T6, T1, T30)
        #[arg(short, long, value_delimiter = ',', default_value = "T24,T6,T1,T30")]
        windows: Vec<WindowId>,
        /// Markets to predict, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "home_win")]
        markets: Vec<MarketId>,
        /// Matchweeks per evaluation period
        #[arg(long, default_value_t = 4)]
        matchweeks: u32,
        /// Skip predictions below this confidence
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Cap on matches per period
        #[arg(long)]
        max_matches: Option<usize>,
        /// Write scored predictions to this CSV file
        #[arg(long)]
        export: Option<String>,
        /// Record per-model errors for weight retraining (ensemble only)
        #[arg(long)]
        record_errors: bool,
        /// Print JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Rank model kinds against the baseline over one season
    Compare {
        /// Model kinds, comma-separated; the baseline is always included
        #[arg(short, long, value_delimiter = ',', default_value = "ensemble,contextual")]
        models: Vec<ModelKind>,
        /// Season label, e.g. 2023-24
        #[arg(short, long)]
        season: String,
        /// Matchweeks per evaluation period
        #[arg(long, default_value_t = 4)]
        matchweeks: u32,
        /// Print JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Compare earlier and later persisted periods of one model
    Overfitting {
        /// Model kind (ensemble, contextual, baseline)
        #[arg(short, long, default_value = "ensemble")]
        model: ModelKind,
        /// Print JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Recompute ensemble weights once from recent errors
    RetrainWeights {
        /// Print JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Retrain ensemble weights on the configured cron schedule (daemon mode)
    WeightDaemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.global.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let config = load_config(&cli.global)?;
    let backend = Backend::open(cli.global.fixture.as_deref(), &config.database).await?;

    match cli.command {
        Commands::Backtest {
            model,
            season,
            windows,
            markets,
            matchweeks,
            min_confidence,
            max_matches,
            export,
            record_errors,
            json,
        } => {
            let mut backtest = BacktestConfig::new(model, WindowId::T24)
                .with_windows(windows)
                .with_markets(markets);
            if let Some(min_confidence) = min_confidence {
                backtest = backtest.with_min_confidence(min_confidence);
            }
            if let Some(max_matches) = max_matches {
                backtest = backtest.with_max_matches(max_matches);
            }
            let options = BacktestOptions {
                season,
                matchweeks,
                export,
                record_errors,
                json,
            };
            run_backtest(backend, config, &backtest, &options).await?;
        }
        Commands::Compare {
            models,
            season,
            matchweeks,
            json,
        } => {
            let service = BacktestService::new(backend.stores, config)
                .with_planner(PeriodPlanner::new(matchweeks));
            let comparison = service.compare_models(&models, &season).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                println!("{}", ReportFormatter::comparison(&comparison));
            }
        }
        Commands::Overfitting { model, json } => {
            let service = BacktestService::new(backend.stores, config);
            let report = service.check_overfitting(model).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", ReportFormatter::overfitting(&report));
            }
        }
        Commands::RetrainWeights { json } => {
            let adapter =
                EnsembleWeightAdapter::new(backend.stores.weights, backend.errors, config.ensemble);
            let Some(report) = adapter.retrain(Utc::now()).await? else {
                bail!("a retrain is already in progress");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", ReportFormatter::retrain(&report));
            }
        }
        Commands::WeightDaemon => {
            let cron_schedule = config.ensemble.cron_schedule.clone();
            let enabled = config.ensemble.enabled;
            let adapter = Arc::new(EnsembleWeightAdapter::new(
                backend.stores.weights,
                backend.errors,
                config.ensemble,
            ));
            let scheduler = WeightRetrainScheduler::new(adapter, cron_schedule, enabled);

            tracing::info!("Press Ctrl+C to stop");
            tokio::select! {
                result = scheduler.start() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Weight daemon stopped"),
            }
        }
    }

    Ok(())
}

fn load_config(global: &GlobalArgs) -> anyhow::Result<AppConfig> {
    if let Some(profile) = &global.profile {
        return ConfigLoader::load_with_profile(profile);
    }
    if !Path::new(&global.config).exists() {
        tracing::warn!(path = %global.config, "Config file not found; using defaults");
    }
    ConfigLoader::load_from(&global.config)
}

struct BacktestOptions {
    season: String,
    matchweeks: u32,
    export: Option<String>,
    record_errors: bool,
    json: bool,
}

async fn run_backtest(
    backend: Backend,
    config: AppConfig,
    backtest: &BacktestConfig,
    options: &BacktestOptions,
) -> anyhow::Result<()> {
    if options.record_errors && backtest.model_kind != ModelKind::Ensemble {
        bail!("--record-errors only applies to the ensemble model");
    }

    let matches = backend
        .stores
        .catalog
        .season_matches(&options.season)
        .await
        .with_context(|| format!("Failed to list matches of season {}", options.season))?;
    let periods = PeriodPlanner::new(options.matchweeks).plan(&matches);
    if periods.is_empty() {
        bail!("season {} has no matches", options.season);
    }

    tracing::info!(
        model = %backtest.model_kind,
        season = %options.season,
        periods = periods.len(),
        "Running walk-forward backtest"
    );

    let service = BacktestService::new(backend.stores, config);
    let cancel = service.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancellation requested; finishing at the next boundary");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let results = service.run(&periods, backtest).await?;

    if let Some(path) = &options.export {
        CsvStorage::write_predictions(path, &results)?;
        tracing::info!(path = %path, "Exported scored predictions");
    }

    if options.record_errors {
        let recorded_at = Utc::now();
        let mut written = 0;
        for result in &results {
            written +=
                record_prediction_errors(backend.errors.as_ref(), &result.predictions, recorded_at)
                    .await?;
        }
        tracing::info!(samples = written, "Recorded model errors");
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", ReportFormatter::backtest(&results));
    }

    Ok(())
}
