//! Small numeric helpers over price windows.

use crate::domain::Decimal;

pub fn to_f64s(values: &[Decimal]) -> Vec<f64> {
    values.iter().map(Decimal::to_f64).collect()
}

/// Simple returns `p[i] / p[i-1] - 1`. Pairs with a zero base are skipped.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Volatility of the trailing `window` prices, or `None` when fewer exist.
pub fn trailing_volatility(prices: &[Decimal], window: usize) -> Option<f64> {
    if window < 2 || prices.len() < window {
        return None;
    }
    let tail = to_f64s(&prices[prices.len() - window..]);
    std_dev(&simple_returns(&tail))
}

/// Drawdown of the last value against the peak of `values`.
pub fn drawdown_from_peak(values: &[Decimal]) -> Option<f64> {
    let last = values.last()?;
    let peak = values.iter().max()?;
    if !peak.is_positive() {
        return None;
    }
    Some(((*last - *peak) / *peak).to_f64())
}
