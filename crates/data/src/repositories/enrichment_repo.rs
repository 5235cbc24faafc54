//! Enrichment layer repository.
//!
//! Reads are point-in-time: only records whose `recorded_at` is strictly
//! before the requested instant are visible.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};

use matchcast_core::{EnrichmentLayer, EnrichmentStore, LayerPayload, LayerRecord};

#[derive(Debug, sqlx::FromRow)]
struct EnrichmentRow {
    match_id: String,
    recorded_at: DateTime<Utc>,
    payload: Json<LayerPayload>,
}

/// Repository for timestamped enrichment records.
#[derive(Debug, Clone)]
pub struct EnrichmentRepository {
    pool: PgPool,
}

impl EnrichmentRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a batch of enrichment records.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn insert_batch(&self, records: &[LayerRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r"
                INSERT INTO enrichment_records (match_id, layer, recorded_at, payload)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(&record.match_id)
            .bind(record.layer().as_str())
            .bind(record.recorded_at)
            .bind(Json(&record.payload))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EnrichmentStore for EnrichmentRepository {
    async fn get(
        &self,
        match_id: &str,
        layer: EnrichmentLayer,
        as_of: DateTime<Utc>,
    ) -> Result<Option<LayerRecord>> {
        let row = sqlx::query_as::<_, EnrichmentRow>(
            r"
            SELECT match_id, recorded_at, payload
            FROM enrichment_records
            WHERE match_id = $1 AND layer = $2 AND recorded_at < $3
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(match_id)
        .bind(layer.as_str())
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| LayerRecord::new(r.match_id, r.recorded_at, r.payload.0)))
    }
}
