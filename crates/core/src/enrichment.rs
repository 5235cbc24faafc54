//! Enrichment layers and timestamped records served by the data store.
//!
//! Every record carries its own provenance timestamp (`recorded_at`). The
//! reconstructor filters on that timestamp, never on which layers a window is
//! configured to use.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of enrichment data attached to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentLayer {
    /// Forecast or observed weather at the venue.
    Weather,
    /// Announced starting lineups.
    Lineups,
    /// Ratings, form, table positions and fixture context.
    Context,
    /// Bookmaker odds.
    Odds,
}

impl EnrichmentLayer {
    /// Every layer.
    pub const ALL: [EnrichmentLayer; 4] = [
        EnrichmentLayer::Weather,
        EnrichmentLayer::Lineups,
        EnrichmentLayer::Context,
        EnrichmentLayer::Odds,
    ];

    /// Canonical identifier string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnrichmentLayer::Weather => "weather",
            EnrichmentLayer::Lineups => "lineups",
            EnrichmentLayer::Context => "context",
            EnrichmentLayer::Odds => "odds",
        }
    }
}

impl fmt::Display for EnrichmentLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weather at the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLayer {
    /// Air temperature in Celsius.
    pub temperature_c: f64,
    /// Precipitation in millimetres per hour.
    pub precipitation_mm: f64,
    /// Wind speed in km/h.
    pub wind_kph: f64,
}

impl WeatherLayer {
    /// Heavy rain or strong wind.
    #[must_use]
    pub fn is_adverse(&self) -> bool {
        self.precipitation_mm >= 5.0 || self.wind_kph >= 40.0
    }

    /// Multiplier applied to expected goal rates, in `[0.8, 1.0]`.
    #[must_use]
    pub fn goal_damping(&self) -> f64 {
        let rain = (self.precipitation_mm / 10.0).min(1.0) * 0.1;
        let wind = (self.wind_kph / 60.0).min(1.0) * 0.08;
        let cold = if self.temperature_c < 0.0 { 0.02 } else { 0.0 };
        (1.0 - rain - wind - cold).max(0.8)
    }
}

/// Announced lineups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupLayer {
    /// Home lineup officially confirmed.
    pub home_confirmed: bool,
    /// Away lineup officially confirmed.
    pub away_confirmed: bool,
    /// Regular starters missing from the home lineup.
    pub home_missing_starters: u8,
    /// Regular starters missing from the away lineup.
    pub away_missing_starters: u8,
}

/// Ratings, expected goals and table context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLayer {
    /// Home team Elo rating.
    pub home_rating: f64,
    /// Away team Elo rating.
    pub away_rating: f64,
    /// Home expected goals.
    pub home_expected_goals: f64,
    /// Away expected goals.
    pub away_expected_goals: f64,
    /// Home league position (1 = top).
    pub home_table_position: u8,
    /// Away league position (1 = top).
    pub away_table_position: u8,
    /// Number of teams in the league.
    pub league_size: u8,
    /// Local or historical rivalry fixture.
    pub is_rivalry: bool,
}

impl ContextLayer {
    fn in_relegation_zone(&self, position: u8) -> bool {
        u16::from(position) + 3 > u16::from(self.league_size)
    }

    /// Either team sits in the bottom three.
    #[must_use]
    pub fn relegation_pressure(&self) -> bool {
        self.in_relegation_zone(self.home_table_position)
            || self.in_relegation_zone(self.away_table_position)
    }

    /// Both teams sit in the top three.
    #[must_use]
    pub fn title_race(&self) -> bool {
        self.home_table_position <= 3 && self.away_table_position <= 3
    }
}

/// Decimal bookmaker odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsLayer {
    /// Home win odds.
    pub home: f64,
    /// Draw odds.
    pub draw: f64,
    /// Away win odds.
    pub away: f64,
    /// Over 2.5 goals odds, if quoted.
    pub over_2_5: Option<f64>,
}

/// Typed payload of an enrichment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", content = "data", rename_all = "snake_case")]
pub enum LayerPayload {
    /// Weather payload.
    Weather(WeatherLayer),
    /// Lineups payload.
    Lineups(LineupLayer),
    /// Context payload.
    Context(ContextLayer),
    /// Odds payload.
    Odds(OddsLayer),
}

impl LayerPayload {
    /// The layer this payload belongs to.
    #[must_use]
    pub fn layer(&self) -> EnrichmentLayer {
        match self {
            LayerPayload::Weather(_) => EnrichmentLayer::Weather,
            LayerPayload::Lineups(_) => EnrichmentLayer::Lineups,
            LayerPayload::Context(_) => EnrichmentLayer::Context,
            LayerPayload::Odds(_) => EnrichmentLayer::Odds,
        }
    }
}

/// One timestamped enrichment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Match the record belongs to.
    pub match_id: String,
    /// Provenance timestamp: when this data became known.
    pub recorded_at: DateTime<Utc>,
    /// The payload.
    pub payload: LayerPayload,
}

impl LayerRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(match_id: impl Into<String>, recorded_at: DateTime<Utc>, payload: LayerPayload) -> Self {
        Self {
            match_id: match_id.into(),
            recorded_at,
            payload,
        }
    }

    /// The record's layer.
    #[must_use]
    pub fn layer(&self) -> EnrichmentLayer {
        self.payload.layer()
    }
}

/// Base identifiers of a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique match identifier.
    pub match_id: String,
    /// Home team, if known.
    pub home_team: Option<String>,
    /// Away team, if known.
    pub away_team: Option<String>,
    /// Scheduled kickoff.
    pub kickoff: DateTime<Utc>,
    /// Season label.
    pub season_label: String,
    /// Matchweek number within the season.
    pub matchweek: u32,
}

/// Settlement status of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Not yet played.
    Scheduled,
    /// In progress.
    Live,
    /// Played to completion.
    Finished,
    /// Moved to a later date.
    Postponed,
    /// Stopped and not completed.
    Abandoned,
}

/// Final result as known to the outcome store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Match identifier.
    pub match_id: String,
    /// Settlement status.
    pub status: MatchStatus,
    /// Home goals in regular time, once settled.
    pub home_goals: Option<u8>,
    /// Away goals in regular time, once settled.
    pub away_goals: Option<u8>,
}
