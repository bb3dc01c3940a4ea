//! Deterministic momentum engine used in MOCK mode and as the fallback.

use super::{Decision, DecisionError, DecisionSource};
use crate::domain::{Action, AssetId, Decimal, Regime};
use async_trait::async_trait;

/// Labels the window by its total price change and trades in that direction.
#[derive(Debug, Clone)]
pub struct MomentumSource {
    threshold: f64,
}

impl MomentumSource {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Regime label implied by a window's price change.
    pub fn regime_for(&self, change: f64) -> Regime {
        if change > self.threshold {
            Regime::Bull
        } else if change < -self.threshold {
            Regime::Bear
        } else {
            Regime::Sideways
        }
    }

    pub fn evaluate(&self, prices: &[Decimal]) -> Decision {
        let Some(change) = price_change(prices) else {
            return Decision {
                action: Action::Hold,
                confidence: 0.5,
                regime: Regime::Sideways,
                risk_score: 0.5,
                reason: "insufficient price history".to_string(),
            };
        };

        let regime = self.regime_for(change);
        let (action, confidence) = match regime {
            Regime::Bull => (Action::Buy, 0.85),
            Regime::Bear => (Action::Sell, 0.80),
            Regime::Sideways => (Action::Hold, 0.60),
        };

        Decision {
            action,
            confidence,
            regime,
            risk_score: (change.abs() * 2.0).min(1.0),
            reason: format!("price change {:.2}%", change * 100.0),
        }
    }
}

impl Default for MomentumSource {
    fn default() -> Self {
        Self::new(0.05)
    }
}

/// `(last - first) / first` over the window.
pub fn price_change(prices: &[Decimal]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let first = prices.first()?;
    let last = prices.last()?;
    let change = (*last - *first).checked_div(*first)?;
    Some(change.to_f64())
}

#[async_trait]
impl DecisionSource for MomentumSource {
    async fn decide(
        &self,
        _asset: &AssetId,
        prices: &[Decimal],
        _volumes: Option<&[Decimal]>,
    ) -> Result<Decision, DecisionError> {
        Ok(self.evaluate(prices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_rise_above_five_percent_buys() {
        let d = MomentumSource::default().evaluate(&prices(&[100, 103, 106]));
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.regime, Regime::Bull);
        assert_eq!(d.confidence, 0.85);
        assert!((d.risk_score - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_fall_below_five_percent_sells() {
        let d = MomentumSource::default().evaluate(&prices(&[100, 97, 90]));
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.regime, Regime::Bear);
        assert_eq!(d.confidence, 0.80);
    }

    #[test]
    fn test_small_moves_hold() {
        let d = MomentumSource::default().evaluate(&prices(&[100, 104]));
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.regime, Regime::Sideways);
        // Exactly +5% is not above the threshold.
        let d = MomentumSource::default().evaluate(&prices(&[100, 105]));
        assert_eq!(d.action, Action::Hold);
    }

    #[test]
    fn test_risk_score_caps_at_one() {
        let d = MomentumSource::default().evaluate(&prices(&[100, 300]));
        assert_eq!(d.risk_score, 1.0);
    }

    #[test]
    fn test_single_price_holds() {
        let d = MomentumSource::default().evaluate(&prices(&[100]));
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.confidence, 0.5);
    }
}
