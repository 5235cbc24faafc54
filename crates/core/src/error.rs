//! Error taxonomy for the backtest engine.
//!
//! Fatal variants stop a run before or while it starts; recoverable variants
//! exclude a single (match, window, market) unit and are counted in the
//! period's coverage.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::MarketId;
use crate::window::WindowId;

/// Errors raised while running a temporal backtest.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Unknown window identifier. Programmer error.
    #[error("invalid window identifier: {0}")]
    InvalidWindow(String),

    /// The reconstructed match state is not sufficient for a prediction.
    #[error("insufficient data for match {match_id} at {window}: {reason}")]
    InsufficientData {
        /// Match that was skipped.
        match_id: String,
        /// Window that was requested.
        window: WindowId,
        /// Human-readable reason.
        reason: String,
    },

    /// No realized outcome for the match/market pair.
    #[error("outcome unavailable for match {match_id} market {market}")]
    OutcomeUnavailable {
        /// Match that was skipped.
        match_id: String,
        /// Market that could not be settled.
        market: MarketId,
    },

    /// An external store read did not complete in time.
    #[error("{store} store timed out after {timeout_ms}ms")]
    ExternalStoreTimeout {
        /// Which store was queried.
        store: &'static str,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Invalid run configuration, detected before any period is processed.
    #[error("configuration invalid: {0}")]
    ConfigValidation(String),

    /// The run was cancelled at a period or match boundary.
    #[error("backtest cancelled at {at}")]
    Cancelled {
        /// Wall-clock time of the cancellation check.
        at: DateTime<Utc>,
    },

    /// A store implementation failed.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl BacktestError {
    /// Returns true if the error only excludes the current unit of work.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BacktestError::InsufficientData { .. }
                | BacktestError::OutcomeUnavailable { .. }
                | BacktestError::ExternalStoreTimeout { .. }
                | BacktestError::Store(_)
        )
    }
}
