//! Splits a season into chronological evaluation periods.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use matchcast_core::{EvaluationPeriod, MatchRecord, MatchweekRange};

/// Groups consecutive matchweeks into [`EvaluationPeriod`]s.
#[derive(Debug, Clone, Copy)]
pub struct PeriodPlanner {
    matchweeks_per_period: u32,
}

impl Default for PeriodPlanner {
    fn default() -> Self {
        Self {
            matchweeks_per_period: 4,
        }
    }
}

impl PeriodPlanner {
    /// Creates a planner; a width of zero is treated as one matchweek.
    #[must_use]
    pub fn new(matchweeks_per_period: u32) -> Self {
        Self {
            matchweeks_per_period: matchweeks_per_period.max(1),
        }
    }

    /// Periods covering every match in `matches`, ascending and non-overlapping.
    ///
    /// Each period starts at the earliest kickoff of its matchweeks and ends
    /// where the next one starts; the last ends one second after the final
    /// kickoff. A chunk whose first kickoff is not after the previous period's
    /// start (rescheduled fixtures) is folded into that period.
    #[must_use]
    pub fn plan(&self, matches: &[MatchRecord]) -> Vec<EvaluationPeriod> {
        let Some(first_week) = matches.iter().map(|m| m.matchweek).min() else {
            return Vec::new();
        };
        let season = matches
            .iter()
            .min_by_key(|m| m.kickoff)
            .map(|m| m.season_label.clone())
            .unwrap_or_default();

        let mut chunks: BTreeMap<u32, Chunk> = BTreeMap::new();
        for m in matches {
            let index = (m.matchweek - first_week) / self.matchweeks_per_period;
            chunks
                .entry(index)
                .and_modify(|c| c.absorb(m))
                .or_insert_with(|| Chunk::single(m));
        }

        let mut merged: Vec<Chunk> = Vec::new();
        for chunk in chunks.into_values() {
            merged.push(chunk);
            while merged.len() >= 2 {
                let n = merged.len();
                if merged[n - 1].first_kickoff > merged[n - 2].first_kickoff {
                    break;
                }
                if let Some(tail) = merged.pop() {
                    merged[n - 2].merge(&tail);
                }
            }
        }

        let starts: Vec<_> = merged.iter().map(|c| c.first_kickoff).collect();
        let last_kickoff = merged
            .iter()
            .map(|c| c.last_kickoff)
            .max()
            .unwrap_or_default();
        merged
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let end = starts
                    .get(i + 1)
                    .copied()
                    .unwrap_or(last_kickoff + Duration::seconds(1));
                EvaluationPeriod::new(
                    chunk.first_kickoff,
                    end,
                    season.clone(),
                    MatchweekRange {
                        first: chunk.first_week,
                        last: chunk.last_week,
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Chunk {
    first_kickoff: DateTime<Utc>,
    last_kickoff: DateTime<Utc>,
    first_week: u32,
    last_week: u32,
}

impl Chunk {
    fn single(m: &MatchRecord) -> Self {
        Self {
            first_kickoff: m.kickoff,
            last_kickoff: m.kickoff,
            first_week: m.matchweek,
            last_week: m.matchweek,
        }
    }

    fn absorb(&mut self, m: &MatchRecord) {
        self.merge(&Chunk::single(m));
    }

    fn merge(&mut self, other: &Chunk) {
        self.first_kickoff = self.first_kickoff.min(other.first_kickoff);
        self.last_kickoff = self.last_kickoff.max(other.last_kickoff);
        self.first_week = self.first_week.min(other.first_week);
        self.last_week = self.last_week.max(other.last_week);
    }
}
