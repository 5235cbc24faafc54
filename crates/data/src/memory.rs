//! In-memory implementation of every store trait.
//!
//! Used by tests and by fixture-driven CLI runs. Reads honour the same
//! timestamp contracts as the PostgreSQL repositories: enrichment reads return
//! only records strictly before `as_of`, weight snapshots only those effective
//! at or before `as_of`.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use matchcast_core::{
    BacktestResult, EnrichmentLayer, EnrichmentStore, ErrorHistoryStore, LayerRecord, MatchCatalog,
    MatchRecord, MatchResult, MatchStatus, ModelErrorSample, ModelId, ModelKind, OutcomeStore,
    ResultStore, WeightSnapshot, WeightStore, WindowId,
};

/// Plain data backing a [`MemoryStore`]; also the JSON fixture format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub matches: Vec<MatchRecord>,
    pub enrichment: Vec<LayerRecord>,
    pub results: Vec<MatchResult>,
    pub weights: Vec<WeightSnapshot>,
    pub errors: Vec<ModelErrorSample>,
}

impl Dataset {
    /// Adds a match.
    #[must_use]
    pub fn with_match(mut self, record: MatchRecord) -> Self {
        self.matches.push(record);
        self
    }

    /// Adds an enrichment record.
    #[must_use]
    pub fn with_layer(mut self, record: LayerRecord) -> Self {
        self.enrichment.push(record);
        self
    }

    /// Adds a final result.
    #[must_use]
    pub fn with_result(mut self, result: MatchResult) -> Self {
        self.results.push(result);
        self
    }

    /// Adds a weight snapshot.
    #[must_use]
    pub fn with_weights(mut self, snapshot: WeightSnapshot) -> Self {
        self.weights.push(snapshot);
        self
    }

    /// Adds an error sample.
    #[must_use]
    pub fn with_error(mut self, sample: ModelErrorSample) -> Self {
        self.errors.push(sample);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    dataset: Dataset,
    period_results: Vec<BacktestResult>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    read_latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates a store over `dataset`.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            state: RwLock::new(State {
                dataset,
                period_results: Vec::new(),
            }),
            read_latency: None,
        }
    }

    /// Delays every enrichment and outcome read, to exercise store timeouts.
    #[must_use]
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Number of persisted period results.
    pub async fn period_result_count(&self) -> usize {
        self.state.read().await.period_results.len()
    }

    /// Every persisted period result, in insertion order.
    pub async fn period_results(&self) -> Vec<BacktestResult> {
        self.state.read().await.period_results.clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn is_finished(dataset: &Dataset, match_id: &str) -> bool {
    dataset
        .results
        .iter()
        .any(|r| r.match_id == match_id && r.status == MatchStatus::Finished)
}

#[async_trait]
impl MatchCatalog for MemoryStore {
    async fn finished_matches(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>> {
        let state = self.state.read().await;
        let mut matches: Vec<MatchRecord> = state
            .dataset
            .matches
            .iter()
            .filter(|m| m.kickoff >= start && m.kickoff < end)
            .filter(|m| is_finished(&state.dataset, &m.match_id))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.match_id.cmp(&b.match_id)));
        Ok(matches)
    }

    async fn season_matches(&self, season_label: &str) -> Result<Vec<MatchRecord>> {
        let state = self.state.read().await;
        let mut matches: Vec<MatchRecord> = state
            .dataset
            .matches
            .iter()
            .filter(|m| m.season_label == season_label)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then_with(|| a.match_id.cmp(&b.match_id)));
        Ok(matches)
    }

    async fn match_record(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        Ok(state
            .dataset
            .matches
            .iter()
            .find(|m| m.match_id == match_id)
            .cloned())
    }
}

#[async_trait]
impl EnrichmentStore for MemoryStore {
    async fn get(
        &self,
        match_id: &str,
        layer: EnrichmentLayer,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LayerRecord>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        Ok(state
            .dataset
            .enrichment
            .iter()
            .filter(|r| r.match_id == match_id && r.layer() == layer && r.recorded_at < as_of)
            .max_by_key(|r| r.recorded_at)
            .cloned())
    }
}

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn result(&self, match_id: &str) -> Result<Option<MatchResult>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        Ok(state
            .dataset
            .results
            .iter()
            .find(|r| r.match_id == match_id)
            .cloned())
    }
}

#[async_trait]
impl WeightStore for MemoryStore {
    async fn get_snapshot(
        &self,
        window: WindowId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<WeightSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .dataset
            .weights
            .iter()
            .filter(|s| s.window == window && s.effective_from <= as_of)
            .max_by(|a, b| {
                a.effective_from
                    .cmp(&b.effective_from)
                    .then_with(|| a.version.cmp(&b.version))
            })
            .cloned())
    }

    async fn publish(
        &self,
        window: WindowId,
        weights: BTreeMap<ModelId, f64>,
        effective_from: DateTime<Utc>,
    ) -> Result<WeightSnapshot> {
        let mut state = self.state.write().await;
        let version = state
            .dataset
            .weights
            .iter()
            .filter(|s| s.window == window)
            .map(|s| s.version)
            .max()
            .unwrap_or(0)
            + 1;
        let snapshot = WeightSnapshot {
            window,
            version,
            effective_from,
            weights,
        };
        state.dataset.weights.push(snapshot.clone());
        Ok(snapshot)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn append_period_result(&self, result: &BacktestResult) -> Result<()> {
        let mut state = self.state.write().await;
        let key = result.idempotency_key();
        if let Some(existing) = state
            .period_results
            .iter_mut()
            .find(|r| r.idempotency_key() == key)
        {
            *existing = result.clone();
        } else {
            state.period_results.push(result.clone());
        }
        Ok(())
    }

    async fn results_for_model(&self, model_kind: ModelKind) -> Result<Vec<BacktestResult>> {
        let state = self.state.read().await;
        let mut results: Vec<BacktestResult> = state
            .period_results
            .iter()
            .filter(|r| r.config.model_kind == model_kind)
            .cloned()
            .collect();
        results.sort_by_key(|r| (r.period.start, r.recorded_at));
        Ok(results)
    }
}

#[async_trait]
impl ErrorHistoryStore for MemoryStore {
    async fn recent_errors(
        &self,
        window: WindowId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ModelErrorSample>> {
        let state = self.state.read().await;
        Ok(state
            .dataset
            .errors
            .iter()
            .filter(|e| e.window == window && e.recorded_at >= since)
            .cloned()
            .collect())
    }

    async fn record_error(&self, sample: ModelErrorSample) -> Result<()> {
        self.state.write().await.dataset.errors.push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use matchcast_core::{LayerPayload, OddsLayer};

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, 15, 0, 0).unwrap()
    }

    fn odds_at(recorded_at: DateTime<Utc>, home: f64) -> LayerRecord {
        LayerRecord::new(
            "m1",
            recorded_at,
            LayerPayload::Odds(OddsLayer {
                home,
                draw: 3.3,
                away: 3.9,
                over_2_5: None,
            }),
        )
    }

    fn match_record(id: &str, kickoff: DateTime<Utc>) -> MatchRecord {
        MatchRecord {
            match_id: id.to_string(),
            home_team: Some("Home".to_string()),
            away_team: Some("Away".to_string()),
            kickoff,
            season_label: "2023-24".to_string(),
            matchweek: 24,
        }
    }

    fn finished(id: &str) -> MatchResult {
        MatchResult {
            match_id: id.to_string(),
            status: MatchStatus::Finished,
            home_goals: Some(1),
            away_goals: Some(0),
        }
    }

    // ============================================================
    // Enrichment reads
    // ============================================================

    #[tokio::test]
    async fn enrichment_read_returns_latest_record_strictly_before_as_of() {
        let as_of = kickoff() - ChronoDuration::hours(1);
        let store = MemoryStore::new(
            Dataset::default()
                .with_layer(odds_at(as_of - ChronoDuration::hours(5), 2.1))
                .with_layer(odds_at(as_of - ChronoDuration::milliseconds(1), 2.0))
                .with_layer(odds_at(as_of, 1.9)),
        );

        let record = store
            .get("m1", EnrichmentLayer::Odds, as_of)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.recorded_at, as_of - ChronoDuration::milliseconds(1));
    }

    #[tokio::test]
    async fn enrichment_read_ignores_other_layers() {
        let store = MemoryStore::new(Dataset::default().with_layer(odds_at(kickoff(), 2.0)));
        let record = store
            .get("m1", EnrichmentLayer::Weather, kickoff() + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert!(record.is_none());
    }

    // ============================================================
    // Catalog
    // ============================================================

    #[tokio::test]
    async fn finished_matches_are_ordered_and_filtered() {
        let store = MemoryStore::new(
            Dataset::default()
                .with_match(match_record("late", kickoff() + ChronoDuration::hours(3)))
                .with_match(match_record("early", kickoff()))
                .with_match(match_record("unplayed", kickoff() + ChronoDuration::hours(1)))
                .with_result(finished("late"))
                .with_result(finished("early")),
        );

        let matches = store
            .finished_matches(kickoff(), kickoff() + ChronoDuration::days(1))
            .await
            .unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.match_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    // ============================================================
    // Weights
    // ============================================================

    #[tokio::test]
    async fn publish_increments_version_and_snapshot_is_time_filtered() {
        let store = MemoryStore::default();
        let first = store
            .publish(WindowId::T1, BTreeMap::from([("elo".to_string(), 1.0)]), kickoff())
            .await
            .unwrap();
        let second = store
            .publish(
                WindowId::T1,
                BTreeMap::from([("elo".to_string(), 0.5), ("poisson".to_string(), 0.5)]),
                kickoff() + ChronoDuration::days(7),
            )
            .await
            .unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let snapshot = store
            .get_snapshot(WindowId::T1, kickoff() + ChronoDuration::days(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.version, 1);

        let none = store
            .get_snapshot(WindowId::T1, kickoff() - ChronoDuration::days(1))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn error_history_is_window_and_time_filtered() {
        let sample = |window, at| ModelErrorSample {
            model_id: "elo".to_string(),
            window,
            absolute_error: 0.3,
            recorded_at: at,
        };
        let store = MemoryStore::new(
            Dataset::default()
                .with_error(sample(WindowId::T1, kickoff()))
                .with_error(sample(WindowId::T1, kickoff() - ChronoDuration::days(40)))
                .with_error(sample(WindowId::T6, kickoff())),
        );
        let errors = store
            .recent_errors(WindowId::T1, kickoff() - ChronoDuration::days(30))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
    }
}
