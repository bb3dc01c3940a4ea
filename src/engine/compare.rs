//! Baseline-versus-treatment comparison and the Relative Survival Alpha score.

use super::ledger::PortfolioMetrics;
use super::stats::mean;
use super::ScenarioResult;
use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Version of the locked RSA formula.
pub const RSA_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RsaError {
    #[error("initial equity must be positive, got {0}")]
    NonPositiveInitialEquity(f64),
    #[error("max drawdown fraction must be within [0, 1], got {0}")]
    DrawdownOutOfRange(f64),
}

/// Relative Survival Alpha, version 1.
///
/// ```text
/// te_norm  = clamp(terminal / initial, 0, 2) / 2
/// survival = 1 - max_drawdown_fraction
/// rsa      = clamp(0.5 * te_norm + 0.5 * survival, 0, 1)
/// ```
pub fn rsa(
    terminal_equity: f64,
    initial_equity: f64,
    max_drawdown_fraction: f64,
) -> Result<f64, RsaError> {
    if initial_equity.is_nan() || initial_equity <= 0.0 {
        return Err(RsaError::NonPositiveInitialEquity(initial_equity));
    }
    if !(0.0..=1.0).contains(&max_drawdown_fraction) {
        return Err(RsaError::DrawdownOutOfRange(max_drawdown_fraction));
    }

    let te_norm = (terminal_equity / initial_equity).clamp(0.0, 2.0) / 2.0;
    let survival = 1.0 - max_drawdown_fraction;
    Ok((0.5 * te_norm + 0.5 * survival).clamp(0.0, 1.0))
}

/// RSA of a finished run; the drawdown fraction is `|max_drawdown|`.
pub fn rsa_from_metrics(metrics: &PortfolioMetrics) -> Result<f64, RsaError> {
    rsa(
        metrics.final_equity.to_f64(),
        metrics.initial_equity.to_f64(),
        metrics.max_drawdown.abs(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_rsa(score: f64) -> Self {
        if score >= 0.95 {
            Grade::APlus
        } else if score >= 0.85 {
            Grade::A
        } else if score >= 0.75 {
            Grade::BPlus
        } else if score >= 0.65 {
            Grade::B
        } else if score >= 0.55 {
            Grade::CPlus
        } else if score >= 0.45 {
            Grade::C
        } else if score >= 0.35 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsaScore {
    pub score: f64,
    pub grade: Grade,
}

impl RsaScore {
    pub fn from_metrics(metrics: &PortfolioMetrics) -> Result<Self, RsaError> {
        let score = rsa_from_metrics(metrics)?;
        Ok(Self {
            score,
            grade: Grade::from_rsa(score),
        })
    }
}

/// Deltas of a treatment run against its baseline on the same dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub dataset: String,
    pub baseline_id: String,
    pub treatment_id: String,
    pub equity_diff: Decimal,
    /// Percent of the baseline final equity.
    pub equity_diff_pct: Option<f64>,
    pub pnl_diff: Decimal,
    /// Percent of `|baseline P&L|`; `None` when the baseline broke even.
    pub pnl_diff_pct: Option<f64>,
    /// Treatment minus baseline max drawdown; positive when shallower.
    pub drawdown_diff: f64,
    /// `None` when the baseline never drew down.
    pub drawdown_improvement_pct: Option<f64>,
    pub trades_diff: i64,
    pub blocked_count: usize,
    pub baseline_rsa: RsaScore,
    pub treatment_rsa: RsaScore,
    pub effects: Vec<String>,
}

fn pct_of(diff: Decimal, base: Decimal) -> Option<f64> {
    diff.checked_div(base).map(|r| r.to_f64() * 100.0)
}

pub fn compare(
    baseline: &ScenarioResult,
    treatment: &ScenarioResult,
) -> Result<Comparison, RsaError> {
    let b = &baseline.metrics;
    let t = &treatment.metrics;

    let equity_diff = t.final_equity - b.final_equity;
    let equity_diff_pct = pct_of(equity_diff, b.final_equity);
    let pnl_diff = t.total_pnl - b.total_pnl;
    let pnl_diff_pct = pct_of(pnl_diff, b.total_pnl.abs());

    let drawdown_diff = t.max_drawdown - b.max_drawdown;
    let drawdown_improvement_pct = if b.max_drawdown == 0.0 {
        None
    } else {
        Some(drawdown_diff / b.max_drawdown.abs() * 100.0)
    };

    let trades_diff = t.total_trades as i64 - b.total_trades as i64;
    let blocked_count = treatment.blocked_count();

    let mut comparison = Comparison {
        dataset: treatment.dataset.clone(),
        baseline_id: baseline.scenario_id.clone(),
        treatment_id: treatment.scenario_id.clone(),
        equity_diff,
        equity_diff_pct,
        pnl_diff,
        pnl_diff_pct,
        drawdown_diff,
        drawdown_improvement_pct,
        trades_diff,
        blocked_count,
        baseline_rsa: RsaScore::from_metrics(b)?,
        treatment_rsa: RsaScore::from_metrics(t)?,
        effects: Vec::new(),
    };
    comparison.effects = narrative(&comparison);
    Ok(comparison)
}

/// Templated sentences describing what the treatment changed.
pub fn narrative(c: &Comparison) -> Vec<String> {
    let mut effects = Vec::new();
    if let Some(improvement) = c.drawdown_improvement_pct {
        if improvement > 0.0 {
            effects.push(format!("Reduced max drawdown by {:.1}%", improvement));
        }
    }
    if c.blocked_count > 0 {
        effects.push(format!("Blocked {} trades via safety rails", c.blocked_count));
    }
    if c.trades_diff < 0 {
        effects.push(format!(
            "Reduced trade count by {} trades",
            c.trades_diff.unsigned_abs()
        ));
    }
    if let Some(pct) = c.equity_diff_pct {
        if pct > 0.0 {
            effects.push(format!("Increased final equity by {:.2}%", pct));
        } else if pct < 0.0 {
            effects.push(format!("Reduced final equity by {:.2}%", pct.abs()));
        }
    }
    effects
}

/// P&L gaps, in percentage points, between a gated run, the hedge and the
/// baseline on one dataset. Negative `shield_vs_*` values are what the shield
/// gave up for its protection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCost {
    pub dataset: String,
    pub config_id: String,
    pub baseline_pnl_pct: f64,
    pub shield_pnl_pct: f64,
    pub hedge_pnl_pct: f64,
    pub shield_vs_baseline: f64,
    pub shield_vs_hedge: f64,
    pub hedge_vs_baseline: f64,
}

pub fn opportunity_cost(
    baseline: &ScenarioResult,
    shield: &ScenarioResult,
    hedge: &ScenarioResult,
) -> OpportunityCost {
    let b = baseline.metrics.pnl_percent;
    let s = shield.metrics.pnl_percent;
    let h = hedge.metrics.pnl_percent;
    OpportunityCost {
        dataset: shield.dataset.clone(),
        config_id: shield.scenario_id.clone(),
        baseline_pnl_pct: b,
        shield_pnl_pct: s,
        hedge_pnl_pct: h,
        shield_vs_baseline: s - b,
        shield_vs_hedge: s - h,
        hedge_vs_baseline: h - b,
    }
}

/// Average P&L of one configuration, the hedge and the baseline over every
/// dataset that ran all three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCostSummary {
    pub config_id: String,
    pub datasets: usize,
    pub avg_baseline_pnl_pct: f64,
    pub avg_shield_pnl_pct: f64,
    pub avg_hedge_pnl_pct: f64,
    pub shield_vs_baseline: f64,
    pub shield_vs_hedge: f64,
    pub hedge_vs_baseline: f64,
}

impl OpportunityCostSummary {
    /// `None` when `config_id` has no per-dataset records.
    pub fn aggregate<'a>(
        config_id: &str,
        costs: impl IntoIterator<Item = &'a OpportunityCost>,
    ) -> Option<Self> {
        let rows: Vec<&OpportunityCost> = costs
            .into_iter()
            .filter(|c| c.config_id == config_id)
            .collect();
        let avg = |f: fn(&OpportunityCost) -> f64| {
            let values: Vec<f64> = rows.iter().map(|c| f(c)).collect();
            mean(&values)
        };
        let baseline = avg(|c| c.baseline_pnl_pct)?;
        let shield = avg(|c| c.shield_pnl_pct)?;
        let hedge = avg(|c| c.hedge_pnl_pct)?;
        Some(Self {
            config_id: config_id.to_string(),
            datasets: rows.len(),
            avg_baseline_pnl_pct: baseline,
            avg_shield_pnl_pct: shield,
            avg_hedge_pnl_pct: hedge,
            shield_vs_baseline: shield - baseline,
            shield_vs_hedge: shield - hedge,
            hedge_vs_baseline: hedge - baseline,
        })
    }
}
