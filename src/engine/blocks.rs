//! Blocked-trade records and their false/true positive classification.

use super::gate::{GateReason, Rail};
use super::regime::MarketRegime;
use crate::domain::{Action, AssetId, Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trailing drawdown magnitude below which a bull-market drawdown block is
/// considered over-sensitive.
pub const BENIGN_DRAWDOWN: f64 = 0.02;

/// Equity points needed before a drawdown block can be judged.
pub const DRAWDOWN_CLASSIFY_POINTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockClassification {
    FalsePositive,
    TruePositive,
    NotApplicable,
}

impl BlockClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockClassification::FalsePositive => "false_positive",
            BlockClassification::TruePositive => "true_positive",
            BlockClassification::NotApplicable => "not_applicable",
        }
    }
}

/// A trade the gate refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub ts: TimeMs,
    pub asset: AssetId,
    pub action: Action,
    pub rail: Rail,
    pub reason: GateReason,
    /// Gate configuration (preset or custom name) that produced the block.
    pub config_id: String,
    pub market_regime: MarketRegime,
    pub confidence: f64,
    /// Drawdown of the last 20 equity points, when that many existed.
    pub trailing_drawdown: Option<f64>,
    pub price: Decimal,
    pub equity: Decimal,
    /// Set post-hoc by [`BlockClassifier`].
    pub classification: Option<BlockClassification>,
}

/// Classifies blocks using regime- and drawdown-conditioned rules.
#[derive(Debug, Clone, Default)]
pub struct BlockClassifier {
    most_conservative: Option<String>,
}

impl BlockClassifier {
    /// `most_conservative` names the configuration whose threshold-rail blocks
    /// in bull markets count as false positives.
    pub fn new(most_conservative: Option<String>) -> Self {
        Self { most_conservative }
    }

    pub fn classify(&self, event: &BlockEvent) -> BlockClassification {
        let regime = event.market_regime;
        match event.rail {
            Rail::Health => BlockClassification::TruePositive,
            Rail::Regime => match regime {
                MarketRegime::MildBear => BlockClassification::TruePositive,
                MarketRegime::StrongBull
                | MarketRegime::MildBull
                | MarketRegime::SidewaysLowVol
                | MarketRegime::SidewaysHighVol => BlockClassification::FalsePositive,
            },
            Rail::Drawdown => match event.trailing_drawdown {
                None => BlockClassification::NotApplicable,
                Some(dd) if regime.is_bull() && dd.abs() < BENIGN_DRAWDOWN => {
                    BlockClassification::FalsePositive
                }
                Some(_) => BlockClassification::TruePositive,
            },
            Rail::Threshold => {
                let is_most_conservative =
                    self.most_conservative.as_deref() == Some(event.config_id.as_str());
                if is_most_conservative && regime.is_bull() {
                    BlockClassification::FalsePositive
                } else {
                    BlockClassification::TruePositive
                }
            }
        }
    }

    /// Stamp a classification on every event.
    pub fn classify_all(&self, events: &mut [BlockEvent]) {
        for event in events.iter_mut() {
            event.classification = Some(self.classify(event));
        }
    }
}

/// Counts behind one false-positive rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FprStats {
    /// Classified blocks, excluding not-applicable ones.
    pub total_blocks: usize,
    pub false_positives: usize,
    pub true_positives: usize,
    pub not_applicable: usize,
    /// FP / (FP + TP); `None` with nothing to judge.
    pub fpr: Option<f64>,
}

impl FprStats {
    fn record(&mut self, classification: BlockClassification) {
        match classification {
            BlockClassification::FalsePositive => self.false_positives += 1,
            BlockClassification::TruePositive => self.true_positives += 1,
            BlockClassification::NotApplicable => self.not_applicable += 1,
        }
        self.total_blocks = self.false_positives + self.true_positives;
        self.fpr = if self.total_blocks == 0 {
            None
        } else {
            Some(self.false_positives as f64 / self.total_blocks as f64)
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FprSummary {
    pub per_rail: BTreeMap<Rail, FprStats>,
    pub per_config: BTreeMap<String, FprStats>,
    pub global: FprStats,
}

impl FprSummary {
    /// Aggregate classified events. Unclassified events are ignored.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a BlockEvent>) -> Self {
        let mut summary = FprSummary::default();
        for rail in Rail::ALL {
            summary.per_rail.insert(rail, FprStats::default());
        }
        for event in events {
            let Some(classification) = event.classification else {
                continue;
            };
            summary
                .per_rail
                .entry(event.rail)
                .or_default()
                .record(classification);
            summary
                .per_config
                .entry(event.config_id.clone())
                .or_default()
                .record(classification);
            summary.global.record(classification);
        }
        summary
    }
}
