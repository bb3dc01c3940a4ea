//! Pure computation engine(s) for deterministic scenario simulation.

use crate::domain::{AssetId, Decimal, EquityPoint, TimeMs, Trade};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod blocks;
pub mod compare;
pub mod cost;
pub mod gate;
pub mod hedge;
pub mod ledger;
pub mod regime;
pub mod runner;
pub mod stats;

pub use blocks::{BlockClassification, BlockClassifier, BlockEvent, FprStats, FprSummary};
pub use compare::{
    compare, opportunity_cost, rsa, Comparison, Grade, OpportunityCost, OpportunityCostSummary,
    RsaError, RsaScore,
};
pub use cost::{execution_cost, ExecutionCostConfig, SlippageModel};
pub use gate::{GateConfig, GateDecision, GateMode, GateReason, Rail, RiskSnapshot, SafetyGate};
pub use hedge::{HedgeConfig, HedgeEvent, HedgeRunner};
pub use ledger::{Ledger, PortfolioMetrics};
pub use regime::{MarketRegime, RegimeClassifier, RegimeFeatures};
pub use runner::{Policy, Runner, RunnerConfig};

/// Which kind of policy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Raw decisions, no gate.
    Baseline,
    /// Decisions filtered by a gate configuration.
    Gated,
    /// Always-in exposure with drawdown-triggered de-risking.
    Hedge,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Baseline => "baseline",
            PolicyKind::Gated => "gated",
            PolicyKind::Hedge => "hedge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCostSummary {
    pub enabled: bool,
    pub model: SlippageModel,
    pub latency_ms: u64,
    pub total: Decimal,
    pub fills_charged: usize,
    pub avg_per_fill: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackNote {
    pub ts: TimeMs,
    pub asset: AssetId,
    pub reason: String,
}

/// How often the primary decision source answered versus the fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub live: usize,
    pub fallback: usize,
    pub fallback_notes: Vec<FallbackNote>,
}

/// Complete output of one (dataset, policy) simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub policy: PolicyKind,
    pub dataset: String,
    pub dataset_fingerprint: String,
    pub metrics: PortfolioMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub block_events: Vec<BlockEvent>,
    pub blocked_by_reason: BTreeMap<GateReason, usize>,
    pub execution_costs: ExecutionCostSummary,
    pub decisions: DecisionStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hedge_events: Vec<HedgeEvent>,
}

impl ScenarioResult {
    pub fn blocked_count(&self) -> usize {
        self.block_events.len()
    }

    pub fn blocks_on(&self, rail: Rail) -> usize {
        self.block_events.iter().filter(|e| e.rail == rail).count()
    }
}
