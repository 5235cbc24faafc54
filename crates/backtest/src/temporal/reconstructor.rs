//! Point-in-time reconstruction of match state.
//!
//! This module is the look-ahead guard of the engine. A reconstructed
//! [`MatchState`] contains only enrichment records whose provenance timestamp
//! is strictly before the freeze instant, regardless of what the window's
//! configuration would like to include.
//!
//! Insufficient state is reported, never patched with defaults: a state with
//! `is_sufficient() == false` must cause the match to be skipped for that
//! window.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use matchcast_core::{
    BacktestError, ContextLayer, EnrichmentLayer, EnrichmentStore, LayerPayload, LineupLayer,
    MatchCatalog, OddsLayer, ReconstructionPolicy, WeatherLayer, WindowId,
};

use crate::stores::bounded_read;

/// Whether a reconstructed state may be predicted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sufficiency {
    /// Enough information was available at the freeze instant.
    Sufficient,
    /// Not enough information; carries the reason.
    Insufficient(String),
}

/// Point-in-time view of a match at a window's freeze instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Match identifier.
    pub match_id: String,
    /// Home team, if known.
    pub home_team: Option<String>,
    /// Away team, if known.
    pub away_team: Option<String>,
    /// Scheduled kickoff.
    pub kickoff: DateTime<Utc>,
    /// Window this state was reconstructed for.
    pub window: WindowId,
    /// Every layer used was recorded strictly before this instant.
    pub freeze_instant: DateTime<Utc>,
    /// Latest weather known at the freeze instant.
    pub weather: Option<WeatherLayer>,
    /// Latest lineups known at the freeze instant.
    pub lineups: Option<LineupLayer>,
    /// Latest context known at the freeze instant.
    pub context: Option<ContextLayer>,
    /// Latest odds known at the freeze instant.
    pub odds: Option<OddsLayer>,
    /// Provenance timestamp of each layer that was used.
    pub layer_timestamps: BTreeMap<EnrichmentLayer, DateTime<Utc>>,
    /// Whether the state may be predicted on.
    pub sufficiency: Sufficiency,
}

impl MatchState {
    fn empty(
        match_id: &str,
        kickoff: DateTime<Utc>,
        window: WindowId,
        freeze_instant: DateTime<Utc>,
    ) -> Self {
        Self {
            match_id: match_id.to_string(),
            home_team: None,
            away_team: None,
            kickoff,
            window,
            freeze_instant,
            weather: None,
            lineups: None,
            context: None,
            odds: None,
            layer_timestamps: BTreeMap::new(),
            sufficiency: Sufficiency::Insufficient("not reconstructed".to_string()),
        }
    }

    /// True if a prediction may be made from this state.
    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        self.sufficiency == Sufficiency::Sufficient
    }

    /// Reason for insufficiency, if any.
    #[must_use]
    pub fn insufficiency_reason(&self) -> Option<&str> {
        match &self.sufficiency {
            Sufficiency::Sufficient => None,
            Sufficiency::Insufficient(reason) => Some(reason),
        }
    }

    /// Layers present in this state.
    #[must_use]
    pub fn present_layers(&self) -> BTreeSet<EnrichmentLayer> {
        self.layer_timestamps.keys().copied().collect()
    }

    /// Converts an insufficient state into the error adapters must raise.
    ///
    /// # Errors
    /// Returns [`BacktestError::InsufficientData`] when the state is insufficient.
    pub fn require_sufficient(&self) -> Result<(), BacktestError> {
        match &self.sufficiency {
            Sufficiency::Sufficient => Ok(()),
            Sufficiency::Insufficient(reason) => Err(BacktestError::InsufficientData {
                match_id: self.match_id.clone(),
                window: self.window,
                reason: reason.clone(),
            }),
        }
    }

    fn apply(&mut self, recorded_at: DateTime<Utc>, payload: LayerPayload) {
        self.layer_timestamps.insert(payload.layer(), recorded_at);
        match payload {
            LayerPayload::Weather(w) => self.weather = Some(w),
            LayerPayload::Lineups(l) => self.lineups = Some(l),
            LayerPayload::Context(c) => self.context = Some(c),
            LayerPayload::Odds(o) => self.odds = Some(o),
        }
    }
}

/// Rebuilds match state from timestamp-filtered store reads.
#[derive(Clone)]
pub struct PointInTimeDataReconstructor {
    catalog: Arc<dyn MatchCatalog>,
    enrichment: Arc<dyn EnrichmentStore>,
    policy: ReconstructionPolicy,
    read_timeout: Duration,
}

impl PointInTimeDataReconstructor {
    /// Creates a reconstructor with the given sufficiency policy.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn MatchCatalog>,
        enrichment: Arc<dyn EnrichmentStore>,
        policy: ReconstructionPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            enrichment,
            policy,
            read_timeout,
        }
    }

    /// Reconstructs `match_id` as it was known just before `freeze_instant`.
    ///
    /// CRITICAL: no record with `recorded_at >= freeze_instant` is ever used,
    /// even if a store returns one.
    ///
    /// # Errors
    /// Returns [`BacktestError::ExternalStoreTimeout`] or [`BacktestError::Store`]
    /// when a read fails. Missing data is not an error; it yields an
    /// insufficient state.
    pub async fn reconstruct(
        &self,
        match_id: &str,
        freeze_instant: DateTime<Utc>,
        window: WindowId,
    ) -> Result<MatchState, BacktestError> {
        let record = bounded_read(
            "catalog",
            self.read_timeout,
            self.catalog.match_record(match_id),
        )
        .await?;

        let Some(record) = record else {
            let mut state = MatchState::empty(
                match_id,
                freeze_instant + window.lead_time(),
                window,
                freeze_instant,
            );
            state.sufficiency = Sufficiency::Insufficient("match not in catalog".to_string());
            return Ok(state);
        };

        let mut state = MatchState::empty(match_id, record.kickoff, window, freeze_instant);
        state.home_team = record.home_team;
        state.away_team = record.away_team;

        for layer in EnrichmentLayer::ALL {
            let found = bounded_read(
                "enrichment",
                self.read_timeout,
                self.enrichment.get(match_id, layer, freeze_instant),
            )
            .await?;

            match found {
                Some(rec) if rec.recorded_at < freeze_instant && rec.layer() == layer => {
                    state.apply(rec.recorded_at, rec.payload);
                }
                Some(rec) => {
                    debug!(
                        match_id,
                        layer = %layer,
                        recorded_at = %rec.recorded_at,
                        freeze = %freeze_instant,
                        "Discarded record not visible at freeze instant"
                    );
                }
                None => {}
            }
        }

        state.sufficiency = self.assess(&state);
        Ok(state)
    }

    fn assess(&self, state: &MatchState) -> Sufficiency {
        if state.home_team.is_none() || state.away_team.is_none() {
            return Sufficiency::Insufficient("team identifiers missing".to_string());
        }

        let requirement = self.policy.requirement(state.window);
        let present = state.present_layers();
        let available = requirement
            .required
            .iter()
            .filter(|layer| present.contains(layer))
            .count();

        if available < requirement.min_available {
            let missing: Vec<&str> = requirement
                .required
                .iter()
                .filter(|layer| !present.contains(layer))
                .map(|layer| layer.as_str())
                .collect();
            return Sufficiency::Insufficient(format!(
                "{available} of {} required layers available (missing: {})",
                requirement.min_available,
                missing.join(", ")
            ));
        }

        Sufficiency::Sufficient
    }
}
