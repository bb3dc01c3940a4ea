//! Relative-strength demo engine: buys oversold windows, sells overbought ones.

use super::momentum::{price_change, MomentumSource};
use super::{Decision, DecisionError, DecisionSource};
use crate::domain::{Action, AssetId, Decimal};
use crate::engine::stats::to_f64s;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct RsiSource {
    period: usize,
    oversold: f64,
    overbought: f64,
    labeler: MomentumSource,
}

impl Default for RsiSource {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
            labeler: MomentumSource::default(),
        }
    }
}

impl RsiSource {
    pub fn evaluate(&self, prices: &[Decimal]) -> Decision {
        let regime = self.labeler.regime_for(price_change(prices).unwrap_or(0.0));
        let Some(rsi) = rsi(prices, self.period) else {
            return Decision {
                action: Action::Hold,
                confidence: 0.5,
                regime,
                risk_score: 0.5,
                reason: "insufficient price history for RSI".to_string(),
            };
        };

        let action = if rsi < self.oversold {
            Action::Buy
        } else if rsi > self.overbought {
            Action::Sell
        } else {
            Action::Hold
        };
        let confidence = if action == Action::Hold { 0.5 } else { 0.6 };

        Decision {
            action,
            confidence,
            regime,
            risk_score: ((rsi - 50.0).abs() / 50.0).min(1.0),
            reason: format!("RSI({}) = {:.1}", self.period, rsi),
        }
    }
}

/// Simple-average RSI over the last `period` price changes.
pub fn rsi(prices: &[Decimal], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    let tail = to_f64s(&prices[prices.len() - (period + 1)..]);
    let (gains, losses) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            (g + delta, l)
        } else {
            (g, l - delta)
        }
    });

    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[async_trait]
impl DecisionSource for RsiSource {
    async fn decide(
        &self,
        _asset: &AssetId,
        prices: &[Decimal],
        _volumes: Option<&[Decimal]>,
    ) -> Result<Decision, DecisionError> {
        Ok(self.evaluate(prices))
    }
}
