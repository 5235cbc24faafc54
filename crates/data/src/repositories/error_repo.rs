//! Per-model prediction error history.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use matchcast_core::{ErrorHistoryStore, ModelErrorSample, WindowId};

use super::parse_window;

#[derive(Debug, sqlx::FromRow)]
struct ErrorRow {
    model_id: String,
    window_id: String,
    absolute_error: f64,
    recorded_at: DateTime<Utc>,
}

/// Repository for model error samples.
#[derive(Debug, Clone)]
pub struct ModelErrorRepository {
    pool: PgPool,
}

impl ModelErrorRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ErrorHistoryStore for ModelErrorRepository {
    async fn recent_errors(
        &self,
        window: WindowId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ModelErrorSample>> {
        let rows = sqlx::query_as::<_, ErrorRow>(
            r"
            SELECT model_id, window_id, absolute_error, recorded_at
            FROM model_errors
            WHERE window_id = $1 AND recorded_at >= $2
            ORDER BY recorded_at ASC
            ",
        )
        .bind(window.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ModelErrorSample {
                    window: parse_window(&row.window_id)?,
                    model_id: row.model_id,
                    absolute_error: row.absolute_error,
                    recorded_at: row.recorded_at,
                })
            })
            .collect()
    }

    async fn record_error(&self, sample: ModelErrorSample) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO model_errors (model_id, window_id, absolute_error, recorded_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&sample.model_id)
        .bind(sample.window.as_str())
        .bind(sample.absolute_error)
        .bind(sample.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
