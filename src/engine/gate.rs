//! Safety gate: a veto layer evaluated in front of every intended trade.

use crate::domain::{Action, AssetId, Decimal, Regime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateMode {
    Strict,
    Permissive,
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateMode::Strict => write!(f, "STRICT"),
            GateMode::Permissive => write!(f, "PERMISSIVE"),
        }
    }
}

impl FromStr for GateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRICT" => Ok(GateMode::Strict),
            "PERMISSIVE" => Ok(GateMode::Permissive),
            other => Err(format!("must be STRICT or PERMISSIVE, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub mode: GateMode,
    /// Negative drawdown fraction, e.g. -0.10.
    pub max_drawdown_threshold: f64,
    pub block_bear_buys: bool,
    pub health_check_enabled: bool,
    /// Optional floor on decision confidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::Permissive,
            max_drawdown_threshold: -0.10,
            block_bear_buys: false,
            health_check_enabled: true,
            min_confidence: None,
        }
    }
}

/// Risk metrics the runner publishes to the gate once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub max_drawdown: f64,
    pub equity: Decimal,
    pub total_trades: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    Ok,
    DrawdownBreach,
    HealthFail,
    RegimeBlock,
    ConfidenceBelowThreshold,
}

impl GateReason {
    /// The rail responsible for a veto. `None` for `Ok`.
    pub fn rail(&self) -> Option<Rail> {
        match self {
            GateReason::Ok => None,
            GateReason::DrawdownBreach => Some(Rail::Drawdown),
            GateReason::HealthFail => Some(Rail::Health),
            GateReason::RegimeBlock => Some(Rail::Regime),
            GateReason::ConfidenceBelowThreshold => Some(Rail::Threshold),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::Ok => "OK",
            GateReason::DrawdownBreach => "DRAWDOWN_BREACH",
            GateReason::HealthFail => "HEALTH_FAIL",
            GateReason::RegimeBlock => "REGIME_BLOCK",
            GateReason::ConfidenceBelowThreshold => "CONFIDENCE_BELOW_THRESHOLD",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Safety rail that produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rail {
    Drawdown,
    Regime,
    Health,
    Threshold,
}

impl Rail {
    pub const ALL: [Rail; 4] = [Rail::Drawdown, Rail::Regime, Rail::Health, Rail::Threshold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rail::Drawdown => "drawdown",
            Rail::Regime => "regime",
            Rail::Health => "health",
            Rail::Threshold => "threshold",
        }
    }
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: GateReason::Ok,
        }
    }

    pub fn block(reason: GateReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Evaluate the rails in order; the first match wins.
pub fn evaluate(
    config: &GateConfig,
    action: Action,
    regime: Regime,
    confidence: f64,
    metrics: Option<&RiskSnapshot>,
    healthy: bool,
) -> GateDecision {
    if let Some(m) = metrics {
        if m.max_drawdown < config.max_drawdown_threshold {
            return GateDecision::block(GateReason::DrawdownBreach);
        }
    }

    if config.health_check_enabled && !healthy {
        return GateDecision::block(GateReason::HealthFail);
    }

    if config.mode == GateMode::Strict
        && config.block_bear_buys
        && regime == Regime::Bear
        && action == Action::Buy
    {
        return GateDecision::block(GateReason::RegimeBlock);
    }

    if let Some(floor) = config.min_confidence {
        if confidence < floor {
            return GateDecision::block(GateReason::ConfidenceBelowThreshold);
        }
    }

    GateDecision::allow()
}

/// Gate with the per-tick context it reads: the latest risk snapshot and the
/// externally settable health flag.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    config: GateConfig,
    metrics: Option<RiskSnapshot>,
    healthy: bool,
}

impl SafetyGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            metrics: None,
            healthy: true,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn set_metrics(&mut self, metrics: RiskSnapshot) {
        self.metrics = Some(metrics);
    }

    pub fn set_health(&mut self, healthy: bool) {
        self.healthy = healthy;
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn filter(
        &self,
        asset: &AssetId,
        action: Action,
        regime: Regime,
        confidence: f64,
    ) -> GateDecision {
        let decision = evaluate(
            &self.config,
            action,
            regime,
            confidence,
            self.metrics.as_ref(),
            self.healthy,
        );
        if !decision.allowed {
            tracing::debug!("gate blocked {} {}: {}", action, asset, decision.reason);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(max_drawdown: f64) -> RiskSnapshot {
        RiskSnapshot {
            max_drawdown,
            equity: Decimal::from(100_000),
            total_trades: 0,
        }
    }

    fn strict() -> GateConfig {
        GateConfig {
            mode: GateMode::Strict,
            block_bear_buys: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_allows_by_default() {
        let d = evaluate(&GateConfig::default(), Action::Buy, Regime::Bull, 0.9, None, true);
        assert_eq!(d, GateDecision::allow());
    }

    #[test]
    fn test_drawdown_breach_in_any_mode() {
        for mode in [GateMode::Strict, GateMode::Permissive] {
            let cfg = GateConfig {
                mode,
                ..Default::default()
            };
            let d = evaluate(&cfg, Action::Sell, Regime::Bull, 0.9, Some(&snapshot(-0.11)), true);
            assert_eq!(d.reason, GateReason::DrawdownBreach);
            assert!(!d.allowed);
        }
    }

    #[test]
    fn test_drawdown_at_threshold_is_allowed() {
        let d = evaluate(
            &GateConfig::default(),
            Action::Buy,
            Regime::Bull,
            0.9,
            Some(&snapshot(-0.10)),
            true,
        );
        assert!(d.allowed);
    }

    #[test]
    fn test_drawdown_rule_wins_over_health() {
        let d = evaluate(&strict(), Action::Buy, Regime::Bear, 0.9, Some(&snapshot(-0.5)), false);
        assert_eq!(d.reason, GateReason::DrawdownBreach);
    }

    #[test]
    fn test_health_fail_only_when_enabled() {
        let d = evaluate(&GateConfig::default(), Action::Buy, Regime::Bull, 0.9, None, false);
        assert_eq!(d.reason, GateReason::HealthFail);

        let cfg = GateConfig {
            health_check_enabled: false,
            ..Default::default()
        };
        let d = evaluate(&cfg, Action::Buy, Regime::Bull, 0.9, None, false);
        assert!(d.allowed);
    }

    #[test]
    fn test_regime_block_is_strict_only() {
        let d = evaluate(&strict(), Action::Buy, Regime::Bear, 0.9, None, true);
        assert_eq!(d.reason, GateReason::RegimeBlock);

        let permissive = GateConfig {
            mode: GateMode::Permissive,
            block_bear_buys: true,
            ..Default::default()
        };
        let d = evaluate(&permissive, Action::Buy, Regime::Bear, 0.9, None, true);
        assert!(d.allowed);
    }

    #[test]
    fn test_regime_block_ignores_sells_and_flag() {
        let d = evaluate(&strict(), Action::Sell, Regime::Bear, 0.9, None, true);
        assert!(d.allowed);

        let cfg = GateConfig {
            block_bear_buys: false,
            ..strict()
        };
        let d = evaluate(&cfg, Action::Buy, Regime::Bear, 0.9, None, true);
        assert!(d.allowed);
    }

    #[test]
    fn test_confidence_floor() {
        let cfg = GateConfig {
            min_confidence: Some(0.7),
            ..Default::default()
        };
        let d = evaluate(&cfg, Action::Buy, Regime::Bull, 0.6, None, true);
        assert_eq!(d.reason, GateReason::ConfidenceBelowThreshold);
        assert_eq!(d.reason.rail(), Some(Rail::Threshold));

        let d = evaluate(&cfg, Action::Buy, Regime::Bull, 0.7, None, true);
        assert!(d.allowed);
    }

    #[test]
    fn test_safety_gate_reads_its_context() {
        let mut gate = SafetyGate::new(strict());
        let btc = AssetId::from("BTC");
        assert!(gate.filter(&btc, Action::Buy, Regime::Bull, 0.9).allowed);

        gate.set_health(false);
        assert_eq!(
            gate.filter(&btc, Action::Buy, Regime::Bull, 0.9).reason,
            GateReason::HealthFail
        );

        gate.set_health(true);
        gate.set_metrics(snapshot(-0.2));
        assert_eq!(
            gate.filter(&btc, Action::Sell, Regime::Bull, 0.9).reason,
            GateReason::DrawdownBreach
        );
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&GateReason::DrawdownBreach).unwrap();
        assert_eq!(json, "\"DRAWDOWN_BREACH\"");
        assert_eq!(serde_json::to_string(&Rail::Threshold).unwrap(), "\"threshold\"");
    }
}
