use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::repositories::Repositories;

const SCHEMA: &str = include_str!("../sql/schema.sql");

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL` database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Creates the tables used by the stores if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply schema")?;
        info!("Database schema ready");
        Ok(())
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Builds every repository over this client's pool.
    #[must_use]
    pub fn repositories(&self) -> Repositories {
        Repositories::new(self.pool.clone())
    }
}
