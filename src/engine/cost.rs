//! Execution cost model: slippage plus a latency penalty, in currency.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Volatility assumed when none is supplied to the vol-scaled model.
pub const DEFAULT_VOLATILITY: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    /// A flat basis-point fraction of notional.
    FixedBps,
    /// Base bps scaled by recent volatility.
    VolScaled,
}

impl fmt::Display for SlippageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlippageModel::FixedBps => write!(f, "fixed_bps"),
            SlippageModel::VolScaled => write!(f, "vol_scaled"),
        }
    }
}

impl FromStr for SlippageModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_bps" => Ok(SlippageModel::FixedBps),
            "vol_scaled" => Ok(SlippageModel::VolScaled),
            other => Err(format!("must be fixed_bps or vol_scaled, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCostConfig {
    pub enabled: bool,
    pub model: SlippageModel,
    pub fixed_bps: Decimal,
    pub base_bps: Decimal,
    pub latency_ms: u64,
}

impl Default for ExecutionCostConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: SlippageModel::FixedBps,
            fixed_bps: Decimal::from(5),
            base_bps: Decimal::from(3),
            latency_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub slippage: Decimal,
    pub latency: Decimal,
    pub total: Decimal,
}

/// Latency penalty in basis points.
pub fn latency_bps(latency_ms: u64) -> Decimal {
    let bps = match latency_ms {
        0..=9 => 0,
        10..=49 => 1,
        50..=199 => 3,
        _ => 5,
    };
    Decimal::from(bps)
}

/// Slippage in basis points for the configured model.
pub fn slippage_bps(config: &ExecutionCostConfig, volatility: Option<f64>) -> Decimal {
    match config.model {
        SlippageModel::FixedBps => config.fixed_bps,
        SlippageModel::VolScaled => {
            let vol = volatility.unwrap_or(DEFAULT_VOLATILITY);
            let multiplier = (vol * 100.0).clamp(1.0, 5.0);
            let multiplier = Decimal::from_f64(multiplier).unwrap_or_else(Decimal::one);
            config.base_bps * multiplier
        }
    }
}

fn bps_of(notional: Decimal, bps: Decimal) -> Decimal {
    notional * bps / Decimal::bps_denominator()
}

/// Full cost breakdown of filling `notional`.
pub fn estimate(
    price: Decimal,
    notional: Decimal,
    config: &ExecutionCostConfig,
    volatility: Option<f64>,
) -> CostBreakdown {
    if !config.enabled || !notional.is_positive() || !price.is_positive() {
        return CostBreakdown::default();
    }

    let slippage = bps_of(notional, slippage_bps(config, volatility));
    let latency = bps_of(notional, latency_bps(config.latency_ms));
    CostBreakdown {
        slippage,
        latency,
        total: slippage + latency,
    }
}

/// Currency cost of filling `notional` at `price`.
pub fn execution_cost(
    price: Decimal,
    notional: Decimal,
    config: &ExecutionCostConfig,
    volatility: Option<f64>,
) -> Decimal {
    estimate(price, notional, config, volatility).total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn enabled(model: SlippageModel) -> ExecutionCostConfig {
        ExecutionCostConfig {
            enabled: true,
            model,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_is_free() {
        let cfg = ExecutionCostConfig::default();
        assert_eq!(execution_cost(d("100"), d("10000"), &cfg, None), Decimal::zero());
    }

    #[test]
    fn test_non_positive_notional_is_free() {
        let cfg = enabled(SlippageModel::FixedBps);
        assert_eq!(execution_cost(d("100"), Decimal::zero(), &cfg, None), Decimal::zero());
        assert_eq!(execution_cost(d("100"), d("-5"), &cfg, None), Decimal::zero());
    }

    #[test]
    fn test_fixed_bps_with_latency() {
        // 5 bps slippage + 3 bps for 50ms latency on 10 000 notional.
        let cfg = enabled(SlippageModel::FixedBps);
        let cost = estimate(d("100"), d("10000"), &cfg, None);
        assert_eq!(cost.slippage, d("5"));
        assert_eq!(cost.latency, d("3"));
        assert_eq!(cost.total, d("8"));
    }

    #[test]
    fn test_latency_buckets() {
        assert_eq!(latency_bps(0), d("0"));
        assert_eq!(latency_bps(9), d("0"));
        assert_eq!(latency_bps(10), d("1"));
        assert_eq!(latency_bps(49), d("1"));
        assert_eq!(latency_bps(50), d("3"));
        assert_eq!(latency_bps(199), d("3"));
        assert_eq!(latency_bps(200), d("5"));
    }

    #[test]
    fn test_vol_scaled_multiplier_is_clamped() {
        let cfg = enabled(SlippageModel::VolScaled);
        // Default vol 0.01 -> multiplier 1.
        assert_eq!(slippage_bps(&cfg, None), d("3"));
        // 0.025 -> 2.5x.
        let scaled = slippage_bps(&cfg, Some(0.025)).to_f64();
        assert!((scaled - 7.5).abs() < 1e-9);
        // Very high vol caps at 5x, very low floors at 1x.
        assert_eq!(slippage_bps(&cfg, Some(0.5)), d("15"));
        assert_eq!(slippage_bps(&cfg, Some(0.0001)), d("3"));
    }

    #[test]
    fn test_slippage_model_parse() {
        assert_eq!("VOL_SCALED".parse::<SlippageModel>().unwrap(), SlippageModel::VolScaled);
        assert!("impact".parse::<SlippageModel>().is_err());
        assert_eq!(SlippageModel::FixedBps.to_string(), "fixed_bps");
    }
}
