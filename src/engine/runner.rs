//! Event-driven replay of a dataset through a decision source and an optional gate.

use super::blocks::{BlockEvent, DRAWDOWN_CLASSIFY_POINTS};
use super::cost::{execution_cost, ExecutionCostConfig};
use super::gate::{GateConfig, GateReason, RiskSnapshot, SafetyGate};
use super::ledger::Ledger;
use super::regime::RegimeClassifier;
use super::stats::{drawdown_from_peak, trailing_volatility};
use super::{DecisionStats, ExecutionCostSummary, FallbackNote, PolicyKind, ScenarioResult};
use crate::decision::{decide_with_fallback, DecisionOutcome, DecisionSource, MomentumSource};
use crate::domain::series::{closes, volumes};
use crate::domain::{Action, AssetId, Dataset, Decimal, EquityPoint, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Decimal places kept on position sizes.
const SIZE_DP: u32 = 18;

/// Sizing, history and cost parameters shared by every policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub initial_equity: Decimal,
    /// Fraction of equity committed per entry.
    pub max_position_fraction: Decimal,
    pub leverage: Decimal,
    /// Trailing points handed to the decision source, current point included.
    pub lookback: usize,
    /// Points required before an asset is traded at all.
    pub min_history: usize,
    /// Trailing prices used for the volatility input to the cost model.
    pub volatility_window: usize,
    pub execution: ExecutionCostConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            initial_equity: Decimal::from(100_000),
            max_position_fraction: Decimal::scaled(1, 1),
            leverage: Decimal::one(),
            lookback: 100,
            min_history: 10,
            volatility_window: 20,
            execution: ExecutionCostConfig::default(),
        }
    }
}

/// Whether decisions pass through a gate before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    Baseline,
    Gated { config_id: String, gate: GateConfig },
}

impl Policy {
    pub fn gated(config_id: impl Into<String>, gate: GateConfig) -> Self {
        Policy::Gated {
            config_id: config_id.into(),
            gate,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Baseline => PolicyKind::Baseline,
            Policy::Gated { .. } => PolicyKind::Gated,
        }
    }

    pub fn scenario_id(&self) -> &str {
        match self {
            Policy::Baseline => "baseline",
            Policy::Gated { config_id, .. } => config_id,
        }
    }
}

/// Replays one dataset under one policy.
#[derive(Debug, Clone)]
pub struct Runner {
    config: RunnerConfig,
    policy: Policy,
    source: Arc<dyn DecisionSource>,
    fallback: Arc<dyn DecisionSource>,
    regime_classifier: RegimeClassifier,
    healthy: bool,
}

impl Runner {
    pub fn new(config: RunnerConfig, policy: Policy, source: Arc<dyn DecisionSource>) -> Self {
        Self {
            config,
            policy,
            source,
            fallback: Arc::new(MomentumSource::default()),
            regime_classifier: RegimeClassifier::default(),
            healthy: true,
        }
    }

    /// Replace the source consulted when the primary one errors.
    pub fn with_fallback(mut self, fallback: Arc<dyn DecisionSource>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the health flag the gate reads for the whole run.
    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the tick loop to completion.
    ///
    /// Never fails: decision source errors become fallbacks, and rejected
    /// fills (minimum history, insufficient cash) are skipped.
    pub async fn run(&self, dataset: &Dataset) -> ScenarioResult {
        let timeline = dataset.timeline();
        info!(
            "Running scenario {} on dataset {} ({} ticks)",
            self.policy.scenario_id(),
            dataset.name(),
            timeline.len()
        );

        let mut ledger = Ledger::new(self.config.initial_equity);
        let mut gate = match &self.policy {
            Policy::Baseline => None,
            Policy::Gated { gate, .. } => {
                let mut g = SafetyGate::new(gate.clone());
                g.set_health(self.healthy);
                Some(g)
            }
        };
        let mut block_events = Vec::new();
        let mut blocked_by_reason: BTreeMap<GateReason, usize> = BTreeMap::new();
        let mut decisions = DecisionStats::default();

        for ts in timeline {
            let prices = prices_at(dataset, ts);
            ledger.mark_to_market(ts, &prices);

            if let Some(g) = gate.as_mut() {
                g.set_metrics(RiskSnapshot {
                    max_drawdown: ledger.max_drawdown(),
                    equity: ledger.equity(),
                    total_trades: ledger.trades().len(),
                });
            }

            for (asset, price) in &prices {
                let Some(series) = dataset.series(asset) else {
                    continue;
                };
                let window = series.window_ending_at(ts, self.config.lookback);
                if window.len() < self.config.min_history {
                    continue;
                }
                let window_closes = closes(window);
                let window_volumes = volumes(window);

                let outcome = decide_with_fallback(
                    self.source.as_ref(),
                    self.fallback.as_ref(),
                    asset,
                    &window_closes,
                    window_volumes.as_deref(),
                )
                .await;
                match &outcome {
                    DecisionOutcome::Live(_) => decisions.live += 1,
                    DecisionOutcome::Fallback { reason, .. } => {
                        decisions.fallback += 1;
                        decisions.fallback_notes.push(FallbackNote {
                            ts,
                            asset: asset.clone(),
                            reason: reason.clone(),
                        });
                    }
                }
                let decision = outcome.decision();

                let holding = ledger.position(asset).is_some();
                let intent = match (decision.action, holding) {
                    (Action::Sell, true) => Action::Sell,
                    (Action::Buy, false) => Action::Buy,
                    _ => continue,
                };

                if let Some(g) = gate.as_ref() {
                    let verdict = g.filter(asset, intent, decision.regime, decision.confidence);
                    if !verdict.allowed {
                        let Some(rail) = verdict.reason.rail() else {
                            continue;
                        };
                        block_events.push(BlockEvent {
                            ts,
                            asset: asset.clone(),
                            action: intent,
                            rail,
                            reason: verdict.reason,
                            config_id: self.policy.scenario_id().to_string(),
                            market_regime: self.regime_classifier.classify(&window_closes),
                            confidence: decision.confidence,
                            trailing_drawdown: trailing_drawdown(ledger.equity_curve()),
                            price: *price,
                            equity: ledger.equity(),
                            classification: None,
                        });
                        *blocked_by_reason.entry(verdict.reason).or_insert(0) += 1;
                        continue;
                    }
                }

                let volatility =
                    trailing_volatility(&window_closes, self.config.volatility_window);
                match intent {
                    Action::Buy => {
                        let basis = ledger.equity();
                        fill_entry(
                            &mut ledger,
                            &self.config,
                            asset,
                            *price,
                            ts,
                            volatility,
                            basis,
                            Decimal::one(),
                        );
                    }
                    _ => {
                        fill_exit(&mut ledger, &self.config, asset, *price, ts, volatility);
                    }
                }
            }

            ledger.mark_to_market(ts, &prices);
        }

        let mut result = finish(
            ledger,
            &self.config,
            dataset,
            self.policy.scenario_id(),
            self.policy.kind(),
        );
        result.block_events = block_events;
        result.blocked_by_reason = blocked_by_reason;
        result.decisions = decisions;

        info!(
            "Scenario {} finished: final equity {}, {} trades, {} blocks",
            result.scenario_id,
            result.metrics.final_equity,
            result.metrics.total_trades,
            result.blocked_count()
        );
        result
    }
}

/// Prices of the assets that have a point at exactly `ts`.
pub(crate) fn prices_at(dataset: &Dataset, ts: TimeMs) -> BTreeMap<AssetId, Decimal> {
    dataset
        .all_series()
        .filter_map(|s| s.price_at(ts).map(|px| (s.asset().clone(), px)))
        .collect()
}

/// Drawdown over the last 20 equity points, when that many exist.
pub(crate) fn trailing_drawdown(curve: &[EquityPoint]) -> Option<f64> {
    if curve.len() < DRAWDOWN_CLASSIFY_POINTS {
        return None;
    }
    let tail: Vec<Decimal> = curve[curve.len() - DRAWDOWN_CLASSIFY_POINTS..]
        .iter()
        .map(|p| p.equity)
        .collect();
    drawdown_from_peak(&tail)
}

/// Enter `asset` sized at `basis` × fraction × leverage × `multiplier`.
///
/// Skipped when the notional plus its execution cost exceeds cash.
pub(crate) fn fill_entry(
    ledger: &mut Ledger,
    config: &RunnerConfig,
    asset: &AssetId,
    price: Decimal,
    ts: TimeMs,
    volatility: Option<f64>,
    basis: Decimal,
    multiplier: Decimal,
) -> bool {
    let target = basis * config.max_position_fraction * config.leverage * multiplier;
    // Truncated so a full allocation never rounds above the cash it came from.
    let Some(size) = target.checked_div(price).map(|s| s.trunc_dp(SIZE_DP)) else {
        return false;
    };
    if !size.is_positive() {
        return false;
    }

    let notional = price * size;
    let cost = execution_cost(price, notional, &config.execution, volatility);
    if notional + cost > ledger.cash() {
        debug!(
            "Skipping entry {} at {}: notional {} + cost {} exceeds cash {}",
            asset,
            ts,
            notional,
            cost,
            ledger.cash()
        );
        return false;
    }

    if !ledger.enter(asset, price, size, ts) {
        return false;
    }
    ledger.charge_cost(cost);
    debug!("BUY {} {} @ {} (cost {})", size, asset, price, cost);
    true
}

/// Exit the whole position in `asset`, charging its execution cost.
pub(crate) fn fill_exit(
    ledger: &mut Ledger,
    config: &RunnerConfig,
    asset: &AssetId,
    price: Decimal,
    ts: TimeMs,
    volatility: Option<f64>,
) -> bool {
    let Some(position) = ledger.position(asset) else {
        return false;
    };
    let notional = price * position.size;
    let cost = execution_cost(price, notional, &config.execution, volatility);

    let Some(trade) = ledger.exit(asset, price, ts) else {
        return false;
    };
    ledger.charge_cost(cost);
    debug!(
        "SELL {} {} @ {} (pnl {:?}, cost {})",
        trade.size, asset, price, trade.pnl, cost
    );
    true
}

/// Fold a finished ledger into a result with empty gate and decision records.
pub(crate) fn finish(
    ledger: Ledger,
    config: &RunnerConfig,
    dataset: &Dataset,
    scenario_id: &str,
    policy: PolicyKind,
) -> ScenarioResult {
    let metrics = ledger.metrics();
    let total = ledger.execution_costs();
    let fills_charged = ledger.charged_fills();
    let avg_per_fill = total
        .checked_div(Decimal::from(fills_charged as i64))
        .unwrap_or_else(Decimal::zero);
    let (trades, equity_curve) = ledger.into_history();

    ScenarioResult {
        scenario_id: scenario_id.to_string(),
        policy,
        dataset: dataset.name().to_string(),
        dataset_fingerprint: dataset.fingerprint(),
        metrics,
        equity_curve,
        trades,
        block_events: Vec::new(),
        blocked_by_reason: BTreeMap::new(),
        execution_costs: ExecutionCostSummary {
            enabled: config.execution.enabled,
            model: config.execution.model,
            latency_ms: config.execution.latency_ms,
            total,
            fills_charged,
            avg_per_fill,
        },
        decisions: DecisionStats::default(),
        hedge_events: Vec::new(),
    }
}
