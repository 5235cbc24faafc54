//! Versioned ensemble weight repository.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use tracing::info;

use matchcast_core::{ModelId, WeightSnapshot, WeightStore, WindowId};

use super::parse_window;

#[derive(Debug, sqlx::FromRow)]
struct WeightRow {
    window_id: String,
    version: i64,
    effective_from: DateTime<Utc>,
    weights: Json<BTreeMap<ModelId, f64>>,
}

impl TryFrom<WeightRow> for WeightSnapshot {
    type Error = anyhow::Error;

    fn try_from(row: WeightRow) -> Result<Self> {
        Ok(WeightSnapshot {
            window: parse_window(&row.window_id)?,
            version: u64::try_from(row.version)?,
            effective_from: row.effective_from,
            weights: row.weights.0,
        })
    }
}

/// Repository for ensemble weight snapshots.
#[derive(Debug, Clone)]
pub struct WeightRepository {
    pool: PgPool,
}

impl WeightRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeightStore for WeightRepository {
    async fn get_snapshot(
        &self,
        window: WindowId,
        as_of: DateTime<Utc>,
    ) -> Result<Option<WeightSnapshot>> {
        let row = sqlx::query_as::<_, WeightRow>(
            r"
            SELECT window_id, version, effective_from, weights
            FROM ensemble_weights
            WHERE window_id = $1 AND effective_from <= $2
            ORDER BY effective_from DESC, version DESC
            LIMIT 1
            ",
        )
        .bind(window.as_str())
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WeightSnapshot::try_from).transpose()
    }

    async fn publish(
        &self,
        window: WindowId,
        weights: BTreeMap<ModelId, f64>,
        effective_from: DateTime<Utc>,
    ) -> Result<WeightSnapshot> {
        let row = sqlx::query_as::<_, WeightRow>(
            r"
            INSERT INTO ensemble_weights (window_id, version, effective_from, weights)
            SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3
            FROM ensemble_weights
            WHERE window_id = $1
            RETURNING window_id, version, effective_from, weights
            ",
        )
        .bind(window.as_str())
        .bind(effective_from)
        .bind(Json(&weights))
        .fetch_one(&self.pool)
        .await?;

        let snapshot = WeightSnapshot::try_from(row)?;
        info!(
            window = %window,
            version = snapshot.version,
            "Published ensemble weights"
        );
        Ok(snapshot)
    }
}
