use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use matchcast_backtest::Stores;
use matchcast_core::{DatabaseConfig, ErrorHistoryStore};
use matchcast_data::{load_dataset, DatabaseClient, MemoryStore};

/// Store handles the commands run against.
pub struct Backend {
    pub stores: Stores,
    pub errors: Arc<dyn ErrorHistoryStore>,
}

impl Backend {
    /// In-memory stores seeded from a JSON fixture. Writes are lost on exit.
    ///
    /// # Errors
    /// Returns an error if the fixture cannot be read or parsed.
    pub fn fixture(path: &Path) -> Result<Self> {
        let dataset = load_dataset(path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?;
        info!(fixture = %path.display(), "Using in-memory stores");
        let store = Arc::new(MemoryStore::new(dataset));
        Ok(Self {
            stores: Stores::shared(store.clone()),
            errors: store,
        })
    }

    /// `PostgreSQL` repositories, creating the schema if needed.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or the schema cannot be applied.
    pub async fn postgres(config: &DatabaseConfig) -> Result<Self> {
        let client = DatabaseClient::new(&config.url, config.max_connections).await?;
        client.ensure_schema().await?;
        let repos = client.repositories();
        Ok(Self {
            stores: Stores {
                catalog: Arc::new(repos.matches.clone()),
                enrichment: Arc::new(repos.enrichment),
                outcomes: Arc::new(repos.matches),
                weights: Arc::new(repos.weights),
                results: Arc::new(repos.period_results),
            },
            errors: Arc::new(repos.model_errors),
        })
    }

    /// Fixture stores when `fixture` is set, the configured database otherwise.
    ///
    /// # Errors
    /// Propagates errors from [`Backend::fixture`] or [`Backend::postgres`].
    pub async fn open(fixture: Option<&Path>, database: &DatabaseConfig) -> Result<Self> {
        match fixture {
            Some(path) => Self::fixture(path),
            None => Self::postgres(database).await,
        }
    }
}
