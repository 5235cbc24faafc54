use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::enrichment::{EnrichmentLayer, LayerRecord, MatchRecord, MatchResult};
use crate::results::{BacktestResult, ModelErrorSample, WeightSnapshot};
use crate::types::{ModelId, ModelKind};
use crate::window::WindowId;

/// Catalog of fixtures.
#[async_trait]
pub trait MatchCatalog: Send + Sync {
    /// Finished matches with kickoff in `[start, end)`, ordered by kickoff.
    async fn finished_matches(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>>;

    /// Every match of a season, ordered by kickoff.
    async fn season_matches(&self, season_label: &str) -> Result<Vec<MatchRecord>>;

    /// Base identifiers of one match.
    async fn match_record(&self, match_id: &str) -> Result<Option<MatchRecord>>;
}

/// Read-only, timestamp-filterable enrichment data.
#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    /// Latest record of `layer` whose `recorded_at` is strictly before `as_of`.
    async fn get(
        &self,
        match_id: &str,
        layer: EnrichmentLayer,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LayerRecord>>;
}

/// Realized match results.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Final result of a match, if the store knows it.
    async fn result(&self, match_id: &str) -> Result<Option<MatchResult>>;
}

/// Versioned ensemble weight tables.
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// Latest snapshot for `window` with `effective_from <= as_of`.
    async fn get_snapshot(
        &self,
        window: WindowId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<WeightSnapshot>>;

    /// Publishes a new version for `window`, returning the stored snapshot.
    async fn publish(
        &self,
        window: WindowId,
        weights: BTreeMap<ModelId, f64>,
        effective_from: DateTime<Utc>,
    ) -> Result<WeightSnapshot>;
}

/// Sink for period results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Appends one period result; idempotent on `(period, config, recorded_at)`.
    async fn append_period_result(&self, result: &BacktestResult) -> Result<()>;

    /// Every persisted result for a model kind, ordered by period start.
    async fn results_for_model(&self, model_kind: ModelKind) -> Result<Vec<BacktestResult>>;
}

/// Per-model error history feeding nightly weight retraining.
#[async_trait]
pub trait ErrorHistoryStore: Send + Sync {
    /// Samples for `window` recorded at or after `since`.
    async fn recent_errors(
        &self,
        window: WindowId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ModelErrorSample>>;

    /// Records one sample.
    async fn record_error(&self, sample: ModelErrorSample) -> Result<()>;
}
