//! Match catalog and outcome repository.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use matchcast_core::{MatchCatalog, MatchRecord, MatchResult, MatchStatus, OutcomeStore};

#[derive(Debug, Clone, sqlx::FromRow)]
struct MatchRow {
    match_id: String,
    home_team: Option<String>,
    away_team: Option<String>,
    kickoff: DateTime<Utc>,
    season_label: String,
    matchweek: i32,
}

impl TryFrom<MatchRow> for MatchRecord {
    type Error = anyhow::Error;

    fn try_from(row: MatchRow) -> Result<Self> {
        Ok(MatchRecord {
            matchweek: u32::try_from(row.matchweek)
                .map_err(|_| anyhow!("negative matchweek for {}", row.match_id))?,
            match_id: row.match_id,
            home_team: row.home_team,
            away_team: row.away_team,
            kickoff: row.kickoff,
            season_label: row.season_label,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ResultRow {
    match_id: String,
    status: String,
    home_goals: Option<i16>,
    away_goals: Option<i16>,
}

fn parse_status(raw: &str) -> Result<MatchStatus> {
    match raw {
        "scheduled" => Ok(MatchStatus::Scheduled),
        "live" => Ok(MatchStatus::Live),
        "finished" => Ok(MatchStatus::Finished),
        "postponed" => Ok(MatchStatus::Postponed),
        "abandoned" => Ok(MatchStatus::Abandoned),
        other => Err(anyhow!("unknown match status: {other}")),
    }
}

fn goals(raw: Option<i16>) -> Option<u8> {
    raw.and_then(|g| u8::try_from(g).ok())
}

impl TryFrom<ResultRow> for MatchResult {
    type Error = anyhow::Error;

    fn try_from(row: ResultRow) -> Result<Self> {
        Ok(MatchResult {
            status: parse_status(&row.status)?,
            match_id: row.match_id,
            home_goals: goals(row.home_goals),
            away_goals: goals(row.away_goals),
        })
    }
}

/// Repository for fixtures and their settlement.
#[derive(Debug, Clone)]
pub struct MatchRepository {
    pool: PgPool,
}

impl MatchRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a fixture.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert_match(&self, record: &MatchRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO matches (match_id, home_team, away_team, kickoff, season_label, matchweek)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (match_id) DO UPDATE
            SET home_team = EXCLUDED.home_team,
                away_team = EXCLUDED.away_team,
                kickoff = EXCLUDED.kickoff,
                season_label = EXCLUDED.season_label,
                matchweek = EXCLUDED.matchweek
            ",
        )
        .bind(&record.match_id)
        .bind(&record.home_team)
        .bind(&record.away_team)
        .bind(record.kickoff)
        .bind(&record.season_label)
        .bind(i32::try_from(record.matchweek)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the settlement of a fixture.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn settle(&self, result: &MatchResult) -> Result<()> {
        let status = match result.status {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Abandoned => "abandoned",
        };
        sqlx::query(
            r"
            UPDATE matches
            SET status = $2, home_goals = $3, away_goals = $4
            WHERE match_id = $1
            ",
        )
        .bind(&result.match_id)
        .bind(status)
        .bind(result.home_goals.map(i16::from))
        .bind(result.away_goals.map(i16::from))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MatchCatalog for MatchRepository {
    async fn finished_matches(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            r"
            SELECT match_id, home_team, away_team, kickoff, season_label, matchweek
            FROM matches
            WHERE kickoff >= $1 AND kickoff < $2 AND status = 'finished'
            ORDER BY kickoff ASC, match_id ASC
            ",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MatchRecord::try_from).collect()
    }

    async fn season_matches(&self, season_label: &str) -> Result<Vec<MatchRecord>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            r"
            SELECT match_id, home_team, away_team, kickoff, season_label, matchweek
            FROM matches
            WHERE season_label = $1
            ORDER BY kickoff ASC, match_id ASC
            ",
        )
        .bind(season_label)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MatchRecord::try_from).collect()
    }

    async fn match_record(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        let row = sqlx::query_as::<_, MatchRow>(
            r"
            SELECT match_id, home_team, away_team, kickoff, season_label, matchweek
            FROM matches
            WHERE match_id = $1
            ",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MatchRecord::try_from).transpose()
    }
}

#[async_trait]
impl OutcomeStore for MatchRepository {
    async fn result(&self, match_id: &str) -> Result<Option<MatchResult>> {
        let row = sqlx::query_as::<_, ResultRow>(
            r"
            SELECT match_id, status, home_goals, away_goals
            FROM matches
            WHERE match_id = $1
            ",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MatchResult::try_from).transpose()
    }
}
