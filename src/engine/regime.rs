//! Market regime classification from a trailing price window.

use super::stats::{mean, simple_returns, std_dev, to_f64s};
use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    StrongBull,
    MildBull,
    MildBear,
    SidewaysLowVol,
    SidewaysHighVol,
}

impl MarketRegime {
    pub fn is_bull(&self) -> bool {
        matches!(self, MarketRegime::StrongBull | MarketRegime::MildBull)
    }

    pub fn is_sideways(&self) -> bool {
        matches!(
            self,
            MarketRegime::SidewaysLowVol | MarketRegime::SidewaysHighVol
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::StrongBull => "STRONG_BULL",
            MarketRegime::MildBull => "MILD_BULL",
            MarketRegime::MildBear => "MILD_BEAR",
            MarketRegime::SidewaysLowVol => "SIDEWAYS_LOW_VOL",
            MarketRegime::SidewaysHighVol => "SIDEWAYS_HIGH_VOL",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistics the classification thresholds are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeFeatures {
    /// Population stdev of simple returns.
    pub volatility: f64,
    /// Total return over the window.
    pub trend: f64,
    /// (max - min) / mean.
    pub range_ratio: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RegimeClassifier {
    pub lookback: usize,
    pub min_points: usize,
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self {
            lookback: 50,
            min_points: 20,
        }
    }
}

impl RegimeClassifier {
    /// Features of the trailing window, or `None` below `min_points`.
    pub fn features(&self, prices: &[Decimal]) -> Option<RegimeFeatures> {
        if prices.len() < self.min_points || prices.len() < 2 {
            return None;
        }
        let start = prices.len().saturating_sub(self.lookback);
        let window = to_f64s(&prices[start..]);

        let first = *window.first()?;
        let last = *window.last()?;
        if first <= 0.0 {
            return None;
        }

        let volatility = std_dev(&simple_returns(&window)).unwrap_or(0.0);
        let trend = last / first - 1.0;
        let max = window.iter().cloned().fold(f64::MIN, f64::max);
        let min = window.iter().cloned().fold(f64::MAX, f64::min);
        let range_ratio = match mean(&window) {
            Some(m) if m > 0.0 => (max - min) / m,
            _ => 0.0,
        };

        Some(RegimeFeatures {
            volatility,
            trend,
            range_ratio,
        })
    }

    pub fn classify(&self, prices: &[Decimal]) -> MarketRegime {
        match self.features(prices) {
            Some(f) => classify_features(&f),
            None => MarketRegime::SidewaysLowVol,
        }
    }
}

pub fn classify_features(f: &RegimeFeatures) -> MarketRegime {
    if f.trend > 0.15 && f.volatility < 0.02 {
        MarketRegime::StrongBull
    } else if f.trend > 0.05 && f.volatility < 0.03 {
        MarketRegime::MildBull
    } else if f.trend < -0.05 && f.volatility < 0.03 {
        MarketRegime::MildBear
    } else if f.trend.abs() < 0.05 && f.volatility < 0.02 {
        MarketRegime::SidewaysLowVol
    } else {
        MarketRegime::SidewaysHighVol
    }
}
