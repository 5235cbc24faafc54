//! Backtest period result repository.
//!
//! Each period result is keyed by (period, configuration, recorded-at), so a
//! retried write replaces the row instead of duplicating it.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use matchcast_core::{BacktestResult, ModelKind, ResultStore};

/// Repository for persisted period results.
#[derive(Debug, Clone)]
pub struct PeriodResultRepository {
    pool: PgPool,
}

impl PeriodResultRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PeriodResultRepository {
    async fn append_period_result(&self, result: &BacktestResult) -> Result<()> {
        let (period_key, config_key, recorded_at) = result.idempotency_key();
        sqlx::query(
            r"
            INSERT INTO backtest_period_results
                (period_key, config_key, recorded_at, model_kind, period_start,
                 run_id, accuracy, brier_score, coverage, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (period_key, config_key, recorded_at) DO UPDATE
            SET run_id = EXCLUDED.run_id,
                accuracy = EXCLUDED.accuracy,
                brier_score = EXCLUDED.brier_score,
                coverage = EXCLUDED.coverage,
                result = EXCLUDED.result
            ",
        )
        .bind(period_key)
        .bind(config_key)
        .bind(recorded_at)
        .bind(result.config.model_kind.as_str())
        .bind(result.period.start)
        .bind(result.run_id)
        .bind(result.metrics.accuracy)
        .bind(result.metrics.brier_score)
        .bind(result.coverage)
        .bind(Json(result))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn results_for_model(&self, model_kind: ModelKind) -> Result<Vec<BacktestResult>> {
        let rows: Vec<(Json<BacktestResult>,)> = sqlx::query_as(
            r"
            SELECT result
            FROM backtest_period_results
            WHERE model_kind = $1
            ORDER BY period_start ASC, recorded_at ASC
            ",
        )
        .bind(model_kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(result,)| result.0).collect())
    }
}
