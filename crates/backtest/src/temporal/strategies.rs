//! Base prediction strategies combined by the ensemble.
//!
//! Each strategy is deterministic and deliberately simple. A strategy returns
//! `None` when the layer it needs is absent from the state or it does not
//! price the requested market.

use matchcast_core::{ContextLayer, MarketId};

use super::reconstructor::MatchState;

/// Elo home advantage in rating points.
pub const ELO_HOME_ADVANTAGE: f64 = 65.0;

/// Goals beyond this are ignored by the Poisson score grid.
const MAX_GOALS: usize = 10;

/// Identifier of a base strategy as stored in weight snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BaseStrategy {
    /// Overround-normalised bookmaker odds.
    OddsImplied,
    /// Rating logistic with home advantage.
    Elo,
    /// Independent Poisson on expected goals.
    Poisson,
    /// Poisson with weather-damped goal rates.
    WeatherPoisson,
}

impl BaseStrategy {
    pub const ALL: [BaseStrategy; 4] = [
        BaseStrategy::OddsImplied,
        BaseStrategy::Elo,
        BaseStrategy::Poisson,
        BaseStrategy::WeatherPoisson,
    ];

    /// Model id used in weight snapshots and error history.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            BaseStrategy::OddsImplied => "odds_implied",
            BaseStrategy::Elo => "elo",
            BaseStrategy::Poisson => "poisson",
            BaseStrategy::WeatherPoisson => "weather_poisson",
        }
    }

    /// Looks a strategy up by model id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Probability of `market` under this strategy.
    #[must_use]
    pub fn estimate(self, state: &MatchState, market: MarketId) -> Option<f64> {
        let p = match self {
            BaseStrategy::OddsImplied => odds_implied(state, market),
            BaseStrategy::Elo => state.context.as_ref().and_then(|c| elo(c, market)),
            BaseStrategy::Poisson => state.context.as_ref().and_then(|c| {
                poisson(c.home_expected_goals, c.away_expected_goals, market)
            }),
            BaseStrategy::WeatherPoisson => {
                let context = state.context.as_ref()?;
                let damping = state.weather.as_ref()?.goal_damping();
                poisson(
                    context.home_expected_goals * damping,
                    context.away_expected_goals * damping,
                    market,
                )
            }
        }?;
        p.is_finite().then(|| p.clamp(0.0, 1.0))
    }
}

fn odds_implied(state: &MatchState, market: MarketId) -> Option<f64> {
    let odds = state.odds.as_ref()?;
    match market {
        MarketId::HomeWin | MarketId::Draw | MarketId::AwayWin => {
            if odds.home <= 1.0 || odds.draw <= 1.0 || odds.away <= 1.0 {
                return None;
            }
            let implied = [1.0 / odds.home, 1.0 / odds.draw, 1.0 / odds.away];
            let book: f64 = implied.iter().sum();
            let index = match market {
                MarketId::HomeWin => 0,
                MarketId::Draw => 1,
                _ => 2,
            };
            Some(implied[index] / book)
        }
        MarketId::Over25 => odds.over_2_5.filter(|o| *o >= 1.0).map(|o| 1.0 / o),
        MarketId::BothTeamsScore => None,
    }
}

fn elo(context: &ContextLayer, market: MarketId) -> Option<f64> {
    let expected =
        1.0 / (1.0 + 10f64.powf((context.away_rating - context.home_rating - ELO_HOME_ADVANTAGE) / 400.0));
    // Draws are likeliest between evenly matched sides.
    let draw = (0.28 - 0.4 * (expected - 0.5).abs()).max(0.05);
    match market {
        MarketId::HomeWin => Some((expected - draw / 2.0).max(0.0)),
        MarketId::Draw => Some(draw),
        MarketId::AwayWin => Some((1.0 - expected - draw / 2.0).max(0.0)),
        MarketId::Over25 | MarketId::BothTeamsScore => None,
    }
}

fn poisson_pmf(lambda: f64, max: usize) -> Vec<f64> {
    let mut pmf = Vec::with_capacity(max + 1);
    let mut p = (-lambda).exp();
    pmf.push(p);
    for k in 1..=max {
        p *= lambda / k as f64;
        pmf.push(p);
    }
    pmf
}

fn poisson(home_rate: f64, away_rate: f64, market: MarketId) -> Option<f64> {
    if !(home_rate > 0.0 && away_rate > 0.0) {
        return None;
    }
    let home = poisson_pmf(home_rate, MAX_GOALS);
    let away = poisson_pmf(away_rate, MAX_GOALS);

    let mut home_win = 0.0;
    let mut draw = 0.0;
    let mut away_win = 0.0;
    let mut over = 0.0;
    let mut total = 0.0;
    for (h, ph) in home.iter().enumerate() {
        for (a, pa) in away.iter().enumerate() {
            let p = ph * pa;
            total += p;
            if h > a {
                home_win += p;
            } else if h == a {
                draw += p;
            } else {
                away_win += p;
            }
            if h + a >= 3 {
                over += p;
            }
        }
    }
    if total <= 0.0 {
        return None;
    }

    let p = match market {
        MarketId::HomeWin => home_win / total,
        MarketId::Draw => draw / total,
        MarketId::AwayWin => away_win / total,
        MarketId::Over25 => over / total,
        MarketId::BothTeamsScore => (1.0 - home[0]) * (1.0 - away[0]),
    };
    Some(p)
}
