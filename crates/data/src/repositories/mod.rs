//! PostgreSQL implementations of the store traits.
//!
//! Each repository provides typed access to one table and implements the
//! matching trait from `matchcast-core`.

pub mod enrichment_repo;
pub mod error_repo;
pub mod match_repo;
pub mod result_repo;
pub mod weight_repo;

pub use enrichment_repo::EnrichmentRepository;
pub use error_repo::ModelErrorRepository;
pub use match_repo::MatchRepository;
pub use result_repo::PeriodResultRepository;
pub use weight_repo::WeightRepository;

use anyhow::{anyhow, Result};
use matchcast_core::WindowId;
use sqlx::PgPool;

/// Creates all repositories from a single database pool.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub matches: MatchRepository,
    pub enrichment: EnrichmentRepository,
    pub weights: WeightRepository,
    pub period_results: PeriodResultRepository,
    pub model_errors: ModelErrorRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            matches: MatchRepository::new(pool.clone()),
            enrichment: EnrichmentRepository::new(pool.clone()),
            weights: WeightRepository::new(pool.clone()),
            period_results: PeriodResultRepository::new(pool.clone()),
            model_errors: ModelErrorRepository::new(pool),
        }
    }
}

pub(crate) fn parse_window(raw: &str) -> Result<WindowId> {
    raw.parse::<WindowId>()
        .map_err(|e| anyhow!("corrupt window column: {e}"))
}
