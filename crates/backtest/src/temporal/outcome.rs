//! Realized outcomes per market.

use std::sync::Arc;
use std::time::Duration;

use matchcast_core::{BacktestError, MarketId, MatchResult, MatchStatus, OutcomeStore};

use crate::stores::bounded_read;

/// Maps finished matches to realized market outcomes.
#[derive(Clone)]
pub struct OutcomeResolver {
    store: Arc<dyn OutcomeStore>,
    read_timeout: Duration,
}

impl OutcomeResolver {
    #[must_use]
    pub fn new(store: Arc<dyn OutcomeStore>, read_timeout: Duration) -> Self {
        Self {
            store,
            read_timeout,
        }
    }

    /// Realized outcome of `market` for `match_id`, or `None` if the match is
    /// not finished or its settlement data is incomplete.
    ///
    /// # Errors
    /// Returns [`BacktestError::ExternalStoreTimeout`] or [`BacktestError::Store`]
    /// when the outcome store read fails.
    pub async fn resolve(
        &self,
        match_id: &str,
        market: MarketId,
    ) -> Result<Option<f64>, BacktestError> {
        let result = self.fetch(match_id).await?;
        Ok(result.as_ref().and_then(|r| outcome_for(r, market)))
    }

    /// Reads the settled result of `match_id` once, for resolving several markets.
    ///
    /// # Errors
    /// Returns [`BacktestError::ExternalStoreTimeout`] or [`BacktestError::Store`]
    /// when the outcome store read fails.
    pub async fn fetch(&self, match_id: &str) -> Result<Option<MatchResult>, BacktestError> {
        bounded_read("outcome", self.read_timeout, self.store.result(match_id)).await
    }
}

/// Outcome of `market` under `result`: 1.0 if it happened, 0.0 if not.
#[must_use]
pub fn outcome_for(result: &MatchResult, market: MarketId) -> Option<f64> {
    if result.status != MatchStatus::Finished {
        return None;
    }
    let (home, away) = (result.home_goals?, result.away_goals?);
    let happened = match market {
        MarketId::HomeWin => home > away,
        MarketId::Draw => home == away,
        MarketId::AwayWin => away > home,
        MarketId::Over25 => u16::from(home) + u16::from(away) >= 3,
        MarketId::BothTeamsScore => home > 0 && away > 0,
    };
    Some(if happened { 1.0 } else { 0.0 })
}
