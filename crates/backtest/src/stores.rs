//! Store handles shared by the runner, the reconstructor and the service.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use matchcast_core::{
    BacktestError, EnrichmentStore, MatchCatalog, OutcomeStore, ResultStore, WeightStore,
};

/// External collaborators consumed by a backtest.
#[derive(Clone)]
pub struct Stores {
    /// Season and match listings.
    pub catalog: Arc<dyn MatchCatalog>,
    /// Timestamped enrichment records.
    pub enrichment: Arc<dyn EnrichmentStore>,
    /// Final results.
    pub outcomes: Arc<dyn OutcomeStore>,
    /// Versioned ensemble weight snapshots.
    pub weights: Arc<dyn WeightStore>,
    /// Persisted period results.
    pub results: Arc<dyn ResultStore>,
}

impl Stores {
    /// Uses one backend for every store.
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: MatchCatalog + EnrichmentStore + OutcomeStore + WeightStore + ResultStore + 'static,
    {
        Self {
            catalog: store.clone(),
            enrichment: store.clone(),
            outcomes: store.clone(),
            weights: store.clone(),
            results: store,
        }
    }
}

/// Runs a store read under `limit`.
///
/// A timeout becomes [`BacktestError::ExternalStoreTimeout`]; a store failure
/// becomes [`BacktestError::Store`].
pub(crate) async fn bounded_read<T, F>(
    store: &'static str,
    limit: Duration,
    read: F,
) -> Result<T, BacktestError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BacktestError::Store(e)),
        Err(_) => Err(BacktestError::ExternalStoreTimeout {
            store,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
