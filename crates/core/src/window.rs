//! Lead-time windows and freeze-instant calculation.
//!
//! A prediction for a window must be frozen at a fixed lead time before
//! kickoff. Every point-in-time read in the backtest is bounded by the
//! instant returned from [`freeze_instant`], so this module is the anchor
//! that keeps look-ahead bias out of the engine.
//!
//! # Window ordering
//!
//! Windows are ordered by information refinement, from the earliest freeze
//! to the latest: `T24 → T6 → T1 → T30`. `T30` freezes thirty minutes before
//! kickoff and therefore sees everything `T1` could see.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// Named lead time before kickoff at which a prediction is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowId {
    /// 24 hours before kickoff.
    T24,
    /// 6 hours before kickoff.
    T6,
    /// 1 hour before kickoff.
    T1,
    /// 30 minutes before kickoff.
    T30,
}

impl WindowId {
    /// All windows in refinement order.
    pub const ORDER: [WindowId; 4] = [WindowId::T24, WindowId::T6, WindowId::T1, WindowId::T30];

    /// Lead time subtracted from kickoff.
    #[must_use]
    pub fn lead_time(self) -> Duration {
        match self {
            WindowId::T24 => Duration::hours(24),
            WindowId::T6 => Duration::hours(6),
            WindowId::T1 => Duration::hours(1),
            WindowId::T30 => Duration::minutes(30),
        }
    }

    /// Position of this window in [`WindowId::ORDER`].
    #[must_use]
    pub fn rank(self) -> usize {
        match self {
            WindowId::T24 => 0,
            WindowId::T6 => 1,
            WindowId::T1 => 2,
            WindowId::T30 => 3,
        }
    }

    /// The window immediately before this one in refinement order.
    #[must_use]
    pub fn previous(self) -> Option<WindowId> {
        match self {
            WindowId::T24 => None,
            WindowId::T6 => Some(WindowId::T24),
            WindowId::T1 => Some(WindowId::T6),
            WindowId::T30 => Some(WindowId::T1),
        }
    }

    /// Canonical identifier string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WindowId::T24 => "T24",
            WindowId::T6 => "T6",
            WindowId::T1 => "T1",
            WindowId::T30 => "T30",
        }
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowId {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "T24" => Ok(WindowId::T24),
            "T6" => Ok(WindowId::T6),
            "T1" => Ok(WindowId::T1),
            "T30" => Ok(WindowId::T30),
            _ => Err(BacktestError::InvalidWindow(s.to_string())),
        }
    }
}

/// Returns the instant at which a prediction for `window` must be frozen.
///
/// Pure and total over [`WindowId`]: `T24 → kickoff − 24h`, `T6 → kickoff − 6h`,
/// `T1 → kickoff − 1h`, `T30 → kickoff − 30min`.
#[must_use]
pub fn freeze_instant(kickoff: DateTime<Utc>, window: WindowId) -> DateTime<Utc> {
    kickoff - window.lead_time()
}

/// Parses a window identifier and returns its freeze instant.
///
/// # Errors
/// Returns [`BacktestError::InvalidWindow`] for identifiers other than
/// `T24`, `T6`, `T1` and `T30`.
pub fn freeze_instant_for(kickoff: DateTime<Utc>, window: &str) -> Result<DateTime<Utc>, BacktestError> {
    let window: WindowId = window.parse()?;
    Ok(freeze_instant(kickoff, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 16, 15, 0, 0).unwrap()
    }

    // ============================================================
    // freeze_instant
    // ============================================================

    #[test]
    fn t24_freezes_one_day_before_kickoff() {
        assert_eq!(
            freeze_instant(kickoff(), WindowId::T24),
            Utc.with_ymd_and_hms(2024, 3, 15, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn t6_freezes_six_hours_before_kickoff() {
        assert_eq!(
            freeze_instant(kickoff(), WindowId::T6),
            Utc.with_ymd_and_hms(2024, 3, 16, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn t1_freezes_one_hour_before_kickoff() {
        assert_eq!(
            freeze_instant(kickoff(), WindowId::T1),
            Utc.with_ymd_and_hms(2024, 3, 16, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn t30_freezes_thirty_minutes_before_kickoff() {
        assert_eq!(
            freeze_instant(kickoff(), WindowId::T30),
            Utc.with_ymd_and_hms(2024, 3, 16, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn freeze_instants_increase_along_refinement_order() {
        let instants: Vec<_> = WindowId::ORDER
            .iter()
            .map(|w| freeze_instant(kickoff(), *w))
            .collect();
        assert!(instants.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn freeze_instant_is_always_before_kickoff() {
        for window in WindowId::ORDER {
            assert!(freeze_instant(kickoff(), window) < kickoff());
        }
    }

    // ============================================================
    // Parsing
    // ============================================================

    #[test]
    fn freeze_instant_for_accepts_every_known_window() {
        for window in WindowId::ORDER {
            let parsed = freeze_instant_for(kickoff(), window.as_str()).unwrap();
            assert_eq!(parsed, freeze_instant(kickoff(), window));
        }
    }

    #[test]
    fn parsing_is_case_insensitive_and_trims() {
        assert_eq!(" t30 ".parse::<WindowId>().unwrap(), WindowId::T30);
    }

    #[test]
    fn unknown_window_is_rejected() {
        let err = freeze_instant_for(kickoff(), "T12").unwrap_err();
        assert!(matches!(err, BacktestError::InvalidWindow(ref w) if w == "T12"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn empty_window_is_rejected() {
        assert!("".parse::<WindowId>().is_err());
    }

    // ============================================================
    // Ordering helpers
    // ============================================================

    #[test]
    fn previous_follows_refinement_order() {
        assert_eq!(WindowId::T24.previous(), None);
        assert_eq!(WindowId::T6.previous(), Some(WindowId::T24));
        assert_eq!(WindowId::T1.previous(), Some(WindowId::T6));
        assert_eq!(WindowId::T30.previous(), Some(WindowId::T1));
    }

    #[test]
    fn rank_matches_order_index() {
        for (idx, window) in WindowId::ORDER.iter().enumerate() {
            assert_eq!(window.rank(), idx);
        }
    }

    #[test]
    fn derived_ordering_matches_refinement_order() {
        let mut shuffled = vec![WindowId::T30, WindowId::T24, WindowId::T1, WindowId::T6];
        shuffled.sort();
        assert_eq!(shuffled, WindowId::ORDER.to_vec());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for window in WindowId::ORDER {
            assert_eq!(window.to_string().parse::<WindowId>().unwrap(), window);
        }
    }
}
