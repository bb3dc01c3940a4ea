//! Rule-based hedge: always in the market, de-risked after a drawdown.
//!
//! The hedge consults no decision source. Every asset with a price is held at
//! net liquidation value × fraction × leverage × multiplier, where the
//! multiplier drops to the configured reduction for a fixed number of ticks
//! once the drawdown of net liquidation value from its peak breaches the
//! threshold. Net liquidation (cash plus marked positions) is used instead of
//! ledger equity because it does not move when positions are opened.

use super::ledger::Ledger;
use super::runner::{fill_entry, fill_exit, finish, prices_at, RunnerConfig};
use super::stats::trailing_volatility;
use super::{PolicyKind, ScenarioResult};
use crate::domain::series::closes;
use crate::domain::{AssetId, Dataset, Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const HEDGE_SCENARIO_ID: &str = "hedge_v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Positive drawdown magnitude that triggers the hedge, e.g. 0.10.
    pub drawdown_threshold: f64,
    /// Exposure multiplier while hedged, e.g. 0.5.
    pub reduction: Decimal,
    /// Ticks the reduced exposure is held before restoring full size.
    pub hold_ticks: usize,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            drawdown_threshold: 0.10,
            reduction: Decimal::scaled(5, 1),
            hold_ticks: 20,
        }
    }
}

/// One hedge episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeEvent {
    pub activated_at: TimeMs,
    /// `None` when the run ended while still hedged.
    pub deactivated_at: Option<TimeMs>,
    pub drawdown_at_activation: f64,
}

#[derive(Debug, Clone)]
pub struct HedgeRunner {
    config: RunnerConfig,
    hedge: HedgeConfig,
}

impl HedgeRunner {
    pub fn new(config: RunnerConfig, hedge: HedgeConfig) -> Self {
        Self { config, hedge }
    }

    pub fn run(&self, dataset: &Dataset) -> ScenarioResult {
        let timeline = dataset.timeline();
        info!(
            "Running {} on dataset {} ({} ticks)",
            HEDGE_SCENARIO_ID,
            dataset.name(),
            timeline.len()
        );

        let mut ledger = Ledger::new(self.config.initial_equity);
        let mut peak = ledger.net_liquidation();
        let mut events: Vec<HedgeEvent> = Vec::new();
        // Ticks elapsed in the current episode; `None` when unhedged.
        let mut hedged_for: Option<usize> = None;

        for ts in timeline {
            let prices = prices_at(dataset, ts);
            ledger.mark_to_market(ts, &prices);
            let value = ledger.net_liquidation();
            if value > peak {
                peak = value;
            }

            match hedged_for {
                Some(ticks) if ticks + 1 >= self.hedge.hold_ticks => {
                    hedged_for = None;
                    if let Some(event) = events.last_mut() {
                        event.deactivated_at = Some(ts);
                    }
                    info!("Hedge deactivated at {}", ts);
                    self.resize_open(&mut ledger, dataset, &prices, ts, Decimal::one());
                }
                Some(ticks) => hedged_for = Some(ticks + 1),
                None => {
                    let drawdown = drawdown_from(peak, value);
                    if drawdown < -self.hedge.drawdown_threshold {
                        hedged_for = Some(0);
                        events.push(HedgeEvent {
                            activated_at: ts,
                            deactivated_at: None,
                            drawdown_at_activation: drawdown,
                        });
                        info!("Hedge activated at {} (drawdown {:.4})", ts, drawdown);
                        self.resize_open(&mut ledger, dataset, &prices, ts, self.hedge.reduction);
                    }
                }
            }

            let multiplier = if hedged_for.is_some() {
                self.hedge.reduction
            } else {
                Decimal::one()
            };
            for (asset, price) in &prices {
                if ledger.position(asset).is_none() {
                    let vol = self.volatility(dataset, asset, ts);
                    let basis = ledger.net_liquidation();
                    fill_entry(
                        &mut ledger,
                        &self.config,
                        asset,
                        *price,
                        ts,
                        vol,
                        basis,
                        multiplier,
                    );
                }
            }

            ledger.mark_to_market(ts, &prices);
        }

        let mut result = finish(
            ledger,
            &self.config,
            dataset,
            HEDGE_SCENARIO_ID,
            PolicyKind::Hedge,
        );
        result.hedge_events = events;
        info!(
            "{} finished: final equity {}, {} hedge episodes",
            HEDGE_SCENARIO_ID,
            result.metrics.final_equity,
            result.hedge_events.len()
        );
        result
    }

    /// Exit every open position with a current price and re-enter it at the
    /// given multiplier.
    fn resize_open(
        &self,
        ledger: &mut Ledger,
        dataset: &Dataset,
        prices: &BTreeMap<AssetId, Decimal>,
        ts: TimeMs,
        multiplier: Decimal,
    ) {
        let open: Vec<AssetId> = ledger.positions().map(|p| p.asset.clone()).collect();
        for asset in open {
            let Some(price) = prices.get(&asset).copied() else {
                continue;
            };
            let vol = self.volatility(dataset, &asset, ts);
            if fill_exit(ledger, &self.config, &asset, price, ts, vol) {
                let basis = ledger.net_liquidation();
                fill_entry(ledger, &self.config, &asset, price, ts, vol, basis, multiplier);
            }
        }
    }

    fn volatility(&self, dataset: &Dataset, asset: &AssetId, ts: TimeMs) -> Option<f64> {
        let series = dataset.series(asset)?;
        let window = series.window_ending_at(ts, self.config.volatility_window);
        trailing_volatility(&closes(window), self.config.volatility_window)
    }
}

fn drawdown_from(peak: Decimal, value: Decimal) -> f64 {
    if !peak.is_positive() {
        return 0.0;
    }
    ((value - peak) / peak).to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PriceSeries, Side};

    fn dataset(closes: Vec<Decimal>) -> Dataset {
        let series =
            PriceSeries::from_closes(AssetId::from("ETH"), TimeMs::new(0), 1_000, &closes).unwrap();
        Dataset::single("hedge", series)
    }

    fn runner(hold_ticks: usize) -> HedgeRunner {
        let config = RunnerConfig {
            max_position_fraction: Decimal::one(),
            ..Default::default()
        };
        HedgeRunner::new(
            config,
            HedgeConfig {
                hold_ticks,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_always_in_without_drawdown() {
        let closes = (0..10).map(|i| Decimal::from(100 + i)).collect();
        let result = runner(20).run(&dataset(closes));

        assert_eq!(result.policy, PolicyKind::Hedge);
        assert_eq!(result.scenario_id, HEDGE_SCENARIO_ID);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].side, Side::Buy);
        assert!(result.hedge_events.is_empty());
        assert_eq!(result.metrics.open_positions, 1);
    }

    #[test]
    fn test_drawdown_activates_then_restores() {
        // Full exposure at 100, a 20% drop, then a recovery to a new peak.
        let closes = [100, 80, 80, 80, 95, 110, 110, 110]
            .iter()
            .map(|p| Decimal::from(*p))
            .collect();
        let result = runner(3).run(&dataset(closes));

        assert_eq!(result.hedge_events.len(), 1);
        let event = &result.hedge_events[0];
        assert_eq!(event.activated_at, TimeMs::new(1_000));
        assert!((event.drawdown_at_activation + 0.2).abs() < 1e-12);
        // Activated at tick 1, three ticks later restored.
        assert_eq!(event.deactivated_at, Some(TimeMs::new(4_000)));

        let sides: Vec<Side> = result.trades.iter().map(|t| t.side).collect();
        assert_eq!(
            sides,
            vec![Side::Buy, Side::Sell, Side::Buy, Side::Sell, Side::Buy]
        );
        // Half of the 80000 equity while hedged, all of the 87500 once restored.
        assert_eq!(result.trades[2].notional(), Decimal::from(40_000));
        assert_eq!(result.trades[4].notional().round_dp(6), Decimal::from(87_500));
    }

    #[test]
    fn test_flat_market_never_hedges() {
        let flat: Vec<Decimal> = vec![Decimal::from(100); 30];
        let series = |name: &str| {
            PriceSeries::from_closes(AssetId::from(name), TimeMs::new(0), 1_000, &flat).unwrap()
        };
        let data = Dataset::new("flat", vec![series("BTC"), series("ETH")]).unwrap();
        let result = HedgeRunner::new(RunnerConfig::default(), HedgeConfig::default()).run(&data);

        assert!(result.hedge_events.is_empty());
        assert_eq!(result.trades.len(), 2);
        // Both legs get the same tenth of the account.
        assert_eq!(result.trades[0].notional(), Decimal::from(10_000));
        assert_eq!(result.trades[1].notional(), Decimal::from(10_000));
    }

    #[test]
    fn test_net_liquidation_ignores_entries() {
        let mut ledger = Ledger::new(Decimal::from(1_000));
        let asset = AssetId::from("ETH");
        assert!(ledger.enter(&asset, Decimal::from(10), Decimal::from(50), TimeMs::new(0)));
        assert_eq!(ledger.net_liquidation(), Decimal::from(1_000));

        let mut prices = BTreeMap::new();
        prices.insert(asset, Decimal::from(8));
        ledger.mark_to_market(TimeMs::new(1), &prices);
        assert_eq!(ledger.net_liquidation(), Decimal::from(900));
    }

    #[test]
    fn test_deterministic() {
        let closes: Vec<Decimal> = (0..40)
            .map(|i| Decimal::from(100 + (i * 7 % 13) - 6))
            .collect();
        let a = runner(5).run(&dataset(closes.clone()));
        let b = runner(5).run(&dataset(closes));
        assert_eq!(a, b);
    }
}
