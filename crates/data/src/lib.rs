//! Store implementations for match-prediction backtesting.
//!
//! This crate provides:
//! - An in-memory store implementing every store trait, for tests and fixtures
//! - `PostgreSQL` repositories implementing the same traits
//! - JSON fixture loading and CSV export of scored predictions

pub mod csv_storage;
pub mod database;
pub mod fixtures;
pub mod memory;
pub mod repositories;

pub use csv_storage::CsvStorage;
pub use database::DatabaseClient;
pub use fixtures::{load_dataset, parse_dataset};
pub use memory::{Dataset, MemoryStore};

pub use repositories::{
    EnrichmentRepository, MatchRepository, ModelErrorRepository, PeriodResultRepository,
    Repositories, WeightRepository,
};
