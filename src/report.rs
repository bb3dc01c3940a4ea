//! Human-readable and tabular renderings of a corpus report.

use crate::engine::{FprStats, ScenarioResult};
use crate::orchestration::CorpusReport;
use serde::Serialize;
use std::fmt::Write as _;
use std::io;

fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v),
        None => "n/a".to_string(),
    }
}

fn fpr_cell(stats: &FprStats) -> String {
    match stats.fpr {
        Some(f) => format!("{:.1}%", f * 100.0),
        None => "n/a".to_string(),
    }
}

fn metrics_row(out: &mut String, result: &ScenarioResult) {
    let m = &result.metrics;
    let _ = writeln!(
        out,
        "| {} | {} | {} | {:+.2}% | {:.2}% | {} | {:.0}% | {} |",
        result.scenario_id,
        result.policy.as_str(),
        m.final_equity.round_dp(2).to_canonical_string(),
        m.pnl_percent,
        m.max_drawdown * 100.0,
        m.total_trades,
        m.win_rate * 100.0,
        result.blocked_count(),
    );
}

/// Markdown summary: metrics per dataset, comparisons against the baseline,
/// the opportunity cost against the hedge and the false-positive tables.
pub fn markdown_summary(report: &CorpusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Scenario report\n");
    let _ = writeln!(out, "Decision source: `{}`", report.source);
    if let Some(name) = &report.most_conservative {
        let _ = writeln!(out, "Most conservative configuration: `{}`", name);
    }

    for dataset in &report.datasets {
        let _ = writeln!(
            out,
            "\n## {} ({} rows, `{}`)\n",
            dataset.dataset, dataset.rows, dataset.fingerprint
        );
        out.push_str("| Scenario | Policy | Final equity | P&L | Max DD | Trades | Win rate | Blocked |\n");
        out.push_str("|---|---|---:|---:|---:|---:|---:|---:|\n");
        metrics_row(&mut out, &dataset.baseline);
        for result in dataset.treatments.iter().chain(dataset.hedge.iter()) {
            metrics_row(&mut out, result);
        }

        if dataset.comparisons.is_empty() {
            continue;
        }
        out.push_str("\n| Treatment | Equity Δ | P&L Δ | DD improvement | Trades Δ | RSA | Grade |\n");
        out.push_str("|---|---:|---:|---:|---:|---:|---|\n");
        for c in &dataset.comparisons {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {:+} | {:.3} | {} |",
                c.treatment_id,
                pct(c.equity_diff_pct),
                pct(c.pnl_diff_pct),
                pct(c.drawdown_improvement_pct),
                c.trades_diff,
                c.treatment_rsa.score,
                c.treatment_rsa.grade,
            );
        }
        out.push('\n');
        for c in &dataset.comparisons {
            if c.effects.is_empty() {
                let _ = writeln!(out, "- **{}**: no material change", c.treatment_id);
            } else {
                let _ = writeln!(out, "- **{}**: {}", c.treatment_id, c.effects.join("; "));
            }
        }
    }

    if !report.opportunity_cost.is_empty() {
        out.push_str("\n## Opportunity cost vs hedge\n\n");
        out.push_str("P&L gaps in percentage points, averaged over datasets with a hedge run.\n\n");
        out.push_str("| Config | Datasets | Baseline P&L | Shield P&L | Hedge P&L | Shield − baseline | Shield − hedge | Hedge − baseline |\n");
        out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|\n");
        for s in &report.opportunity_cost {
            let _ = writeln!(
                out,
                "| {} | {} | {:+.2}% | {:+.2}% | {:+.2}% | {:+.2} | {:+.2} | {:+.2} |",
                s.config_id,
                s.datasets,
                s.avg_baseline_pnl_pct,
                s.avg_shield_pnl_pct,
                s.avg_hedge_pnl_pct,
                s.shield_vs_baseline,
                s.shield_vs_hedge,
                s.hedge_vs_baseline,
            );
        }
    }

    out.push_str("\n## False positives\n\n");
    out.push_str("| Rail | FP | TP | N/A | FPR |\n|---|---:|---:|---:|---:|\n");
    for (rail, stats) in &report.fpr.per_rail {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            rail,
            stats.false_positives,
            stats.true_positives,
            stats.not_applicable,
            fpr_cell(stats)
        );
    }
    if !report.fpr.per_config.is_empty() {
        out.push_str("\n| Config | FP | TP | N/A | FPR |\n|---|---:|---:|---:|---:|\n");
        for (config, stats) in &report.fpr.per_config {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                config,
                stats.false_positives,
                stats.true_positives,
                stats.not_applicable,
                fpr_cell(stats)
            );
        }
    }
    let g = &report.fpr.global;
    let _ = writeln!(
        out,
        "\nGlobal: {} judged blocks, {} false positives, FPR {}",
        g.total_blocks,
        g.false_positives,
        fpr_cell(g)
    );
    out
}

#[derive(Serialize)]
struct BlockRow<'a> {
    dataset: &'a str,
    config_id: &'a str,
    ts: i64,
    asset: &'a str,
    action: String,
    rail: &'static str,
    reason: &'static str,
    market_regime: &'static str,
    confidence: f64,
    trailing_drawdown: Option<f64>,
    price: String,
    equity: String,
    classification: Option<&'static str>,
}

/// Write every block event of every gated run as CSV. Returns the row count.
pub fn write_block_events_csv<W: io::Write>(
    report: &CorpusReport,
    writer: W,
) -> Result<usize, csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut rows = 0usize;
    for dataset in &report.datasets {
        for event in dataset.treatments.iter().flat_map(|t| t.block_events.iter()) {
            wtr.serialize(BlockRow {
                dataset: &dataset.dataset,
                config_id: &event.config_id,
                ts: event.ts.as_ms(),
                asset: event.asset.as_str(),
                action: event.action.to_string(),
                rail: event.rail.as_str(),
                reason: event.reason.as_str(),
                market_regime: event.market_regime.as_str(),
                confidence: event.confidence,
                trailing_drawdown: event.trailing_drawdown,
                price: event.price.to_canonical_string(),
                equity: event.equity.round_dp(2).to_canonical_string(),
                classification: event.classification.map(|c| c.as_str()),
            })?;
            rows += 1;
        }
    }
    wtr.flush()?;
    Ok(rows)
}
