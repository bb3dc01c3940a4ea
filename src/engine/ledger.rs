use crate::domain::{AssetId, Decimal, EquityPoint, Position, Side, TimeMs, Trade};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Summary figures of a finished (or in-flight) ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_pnl: Decimal,
    pub pnl_percent: f64,
    /// Most negative drawdown observed, as a fraction (≤ 0).
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    /// Winning exits over all exits.
    pub win_rate: f64,
    pub open_positions: usize,
}

/// Cash, positions and equity history of one simulated account.
///
/// Equity is always `cash + Σ unrealized P&L`; every mutation revalues it at the
/// latest marks. Policy rejections are reported through return values.
pub struct Ledger {
    initial_equity: Decimal,
    cash: Decimal,
    equity: Decimal,
    peak_equity: Decimal,
    max_drawdown: f64,
    marks: BTreeMap<AssetId, Decimal>,
    positions: BTreeMap<AssetId, Position>,

    // History accumulated during the run.
    trades: Vec<Trade>,
    curve: Vec<EquityPoint>,
    execution_costs: Decimal,
    charged_fills: usize,
}

impl Ledger {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            cash: initial_equity,
            equity: initial_equity,
            peak_equity: initial_equity,
            max_drawdown: 0.0,
            marks: BTreeMap::new(),
            positions: BTreeMap::new(),
            trades: Vec::new(),
            curve: vec![EquityPoint {
                ts: None,
                cash: initial_equity,
                unrealized: Decimal::zero(),
                equity: initial_equity,
            }],
            execution_costs: Decimal::zero(),
            charged_fills: 0,
        }
    }

    /// Record the latest prices, revalue and append a curve point.
    ///
    /// Assets absent from `prices` keep their previous mark (or entry price).
    /// Marking the same timestamp twice replaces that tick's point, so the
    /// curve holds one settled point per tick.
    pub fn mark_to_market(&mut self, ts: TimeMs, prices: &BTreeMap<AssetId, Decimal>) {
        for (asset, price) in prices {
            self.marks.insert(asset.clone(), *price);
        }

        let unrealized = self.revalue();
        let point = EquityPoint {
            ts: Some(ts),
            cash: self.cash,
            unrealized,
            equity: self.equity,
        };
        match self.curve.last_mut() {
            Some(last) if last.ts == Some(ts) => *last = point,
            _ => self.curve.push(point),
        }

        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
        if let Some(dd) = self.current_drawdown() {
            if dd < self.max_drawdown {
                self.max_drawdown = dd;
            }
        }
    }

    /// Open a position. Returns false, leaving the ledger untouched, when a
    /// position already exists, the inputs are not positive, or cash is short.
    pub fn enter(&mut self, asset: &AssetId, price: Decimal, size: Decimal, ts: TimeMs) -> bool {
        if self.positions.contains_key(asset) {
            debug!("enter {} rejected: position already open", asset);
            return false;
        }
        if !price.is_positive() || !size.is_positive() {
            debug!("enter {} rejected: non-positive price or size", asset);
            return false;
        }
        let notional = price * size;
        if notional > self.cash {
            debug!(
                "enter {} rejected: notional {} exceeds cash {}",
                asset, notional, self.cash
            );
            return false;
        }

        self.cash -= notional;
        self.marks.entry(asset.clone()).or_insert(price);
        self.positions.insert(
            asset.clone(),
            Position {
                asset: asset.clone(),
                entry_price: price,
                size,
                entry_ts: ts,
            },
        );
        self.revalue();

        self.trades.push(Trade {
            asset: asset.clone(),
            side: Side::Buy,
            price,
            size,
            ts,
            pnl: None,
            pnl_percent: None,
            execution_cost: Decimal::zero(),
            equity_after: self.equity,
        });
        true
    }

    /// Close the whole position at `price`. `None` when nothing is open.
    pub fn exit(&mut self, asset: &AssetId, price: Decimal, ts: TimeMs) -> Option<Trade> {
        let position = self.positions.remove(asset)?;

        let proceeds = price * position.size;
        let pnl = position.unrealized_pnl(price);
        let pnl_percent = pnl
            .checked_div(position.notional())
            .map(|r| r * Decimal::hundred());

        self.cash += proceeds;
        self.revalue();

        let trade = Trade {
            asset: asset.clone(),
            side: Side::Sell,
            price,
            size: position.size,
            ts,
            pnl: Some(pnl),
            pnl_percent,
            execution_cost: Decimal::zero(),
            equity_after: self.equity,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Debit an execution cost for the fill just recorded.
    pub fn charge_cost(&mut self, cost: Decimal) {
        if cost.is_zero() {
            return;
        }
        self.cash -= cost;
        self.execution_costs += cost;
        self.charged_fills += 1;
        self.revalue();

        let equity = self.equity;
        if let Some(last) = self.trades.last_mut() {
            last.execution_cost += cost;
            last.equity_after = equity;
        }
    }

    fn unrealized(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| {
                let mark = self.marks.get(&p.asset).copied().unwrap_or(p.entry_price);
                p.unrealized_pnl(mark)
            })
            .sum()
    }

    fn revalue(&mut self) -> Decimal {
        let unrealized = self.unrealized();
        self.equity = self.cash + unrealized;
        unrealized
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Cash plus the marked value of every open position.
    ///
    /// Unlike [`Ledger::equity`] this does not move when a position is opened
    /// or closed at its mark; only price moves and costs change it.
    pub fn net_liquidation(&self) -> Decimal {
        let held: Decimal = self
            .positions
            .values()
            .map(|p| {
                let mark = self.marks.get(&p.asset).copied().unwrap_or(p.entry_price);
                mark * p.size
            })
            .sum();
        self.cash + held
    }

    /// Drawdown of current equity against the running peak.
    pub fn current_drawdown(&self) -> Option<f64> {
        if !self.peak_equity.is_positive() {
            return None;
        }
        Some(((self.equity - self.peak_equity) / self.peak_equity).to_f64())
    }

    pub fn position(&self, asset: &AssetId) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    pub fn execution_costs(&self) -> Decimal {
        self.execution_costs
    }

    pub fn charged_fills(&self) -> usize {
        self.charged_fills
    }

    pub fn metrics(&self) -> PortfolioMetrics {
        let total_pnl = self.equity - self.initial_equity;
        let pnl_percent = total_pnl
            .checked_div(self.initial_equity)
            .map(|r| r.to_f64() * 100.0)
            .unwrap_or(0.0);

        let exits: Vec<&Trade> = self.trades.iter().filter(|t| t.side == Side::Sell).collect();
        let winning_trades = exits.iter().filter(|t| t.is_winner()).count();
        let win_rate = if exits.is_empty() {
            0.0
        } else {
            winning_trades as f64 / exits.len() as f64
        };

        PortfolioMetrics {
            initial_equity: self.initial_equity,
            final_equity: self.equity,
            total_pnl,
            pnl_percent,
            max_drawdown: self.max_drawdown,
            total_trades: self.trades.len(),
            winning_trades,
            win_rate,
            open_positions: self.positions.len(),
        }
    }

    /// Consume the ledger, yielding its trade log and equity curve.
    pub fn into_history(self) -> (Vec<Trade>, Vec<EquityPoint>) {
        (self.trades, self.curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn btc() -> AssetId {
        AssetId::from("BTC")
    }

    fn marks(px: &str) -> BTreeMap<AssetId, Decimal> {
        let mut m = BTreeMap::new();
        m.insert(btc(), d(px));
        m
    }

    #[test]
    fn test_enter_rejects_second_position() {
        let mut ledger = Ledger::new(d("1000"));
        assert!(ledger.enter(&btc(), d("10"), d("5"), TimeMs::new(1)));
        assert!(!ledger.enter(&btc(), d("10"), d("5"), TimeMs::new(2)));
        assert_eq!(ledger.trades().len(), 1);
        assert_eq!(ledger.cash(), d("950"));
    }

    #[test]
    fn test_enter_rejects_insufficient_cash_without_mutation() {
        let mut ledger = Ledger::new(d("100"));
        assert!(!ledger.enter(&btc(), d("10"), d("10.01"), TimeMs::new(1)));
        assert_eq!(ledger.cash(), d("100"));
        assert!(ledger.position(&btc()).is_none());
        assert!(ledger.trades().is_empty());
    }

    #[test]
    fn test_enter_rejects_non_positive_size() {
        let mut ledger = Ledger::new(d("100"));
        assert!(!ledger.enter(&btc(), d("10"), Decimal::zero(), TimeMs::new(1)));
    }

    #[test]
    fn test_exit_without_position_is_none() {
        let mut ledger = Ledger::new(d("100"));
        assert!(ledger.exit(&btc(), d("10"), TimeMs::new(1)).is_none());
        assert_eq!(ledger.cash(), d("100"));
    }

    #[test]
    fn test_exit_realizes_pnl() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        let trade = ledger.exit(&btc(), d("12"), TimeMs::new(2)).unwrap();

        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.pnl, Some(d("20")));
        assert_eq!(trade.pnl_percent, Some(d("20")));
        assert_eq!(ledger.cash(), d("1020"));
        assert!(ledger.position(&btc()).is_none());
    }

    #[test]
    fn test_equity_is_cash_plus_unrealized() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.mark_to_market(TimeMs::new(1), &marks("10"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        ledger.mark_to_market(TimeMs::new(2), &marks("8"));

        assert_eq!(ledger.equity(), d("880"));
        for point in ledger.equity_curve() {
            assert_eq!(point.equity, point.cash + point.unrealized);
        }
    }

    #[test]
    fn test_missing_mark_keeps_last_price() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        ledger.mark_to_market(TimeMs::new(2), &marks("11"));
        ledger.mark_to_market(TimeMs::new(3), &BTreeMap::new());
        assert_eq!(ledger.equity(), d("910"));
    }

    #[test]
    fn test_max_drawdown_never_recovers() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.enter(&btc(), d("10"), d("50"), TimeMs::new(0));
        let mut last = 0.0;
        for (i, px) in ["10", "8", "12", "9", "15"].iter().enumerate() {
            ledger.mark_to_market(TimeMs::new(i as i64 + 1), &marks(px));
            assert!(ledger.max_drawdown() <= last);
            last = ledger.max_drawdown();
        }
        // Deepest point: cash 500 + (8 - 10) * 50 = 400 against peak 1000.
        assert!((ledger.max_drawdown() + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_charge_cost_books_on_last_trade() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        ledger.charge_cost(d("0.5"));

        assert_eq!(ledger.cash(), d("899.5"));
        assert_eq!(ledger.execution_costs(), d("0.5"));
        assert_eq!(ledger.charged_fills(), 1);
        let trade = ledger.trades().last().unwrap();
        assert_eq!(trade.execution_cost, d("0.5"));
        assert_eq!(trade.equity_after, d("899.5"));
    }

    #[test]
    fn test_metrics_win_rate_over_exits() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        ledger.exit(&btc(), d("11"), TimeMs::new(2));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(3));
        ledger.exit(&btc(), d("9"), TimeMs::new(4));

        let m = ledger.metrics();
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.winning_trades, 1);
        assert!((m.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(m.total_pnl, Decimal::zero());
        assert_eq!(m.open_positions, 0);
    }

    #[test]
    fn test_second_mark_in_tick_replaces_point() {
        let mut ledger = Ledger::new(d("1000"));
        ledger.mark_to_market(TimeMs::new(1), &marks("10"));
        ledger.enter(&btc(), d("10"), d("10"), TimeMs::new(1));
        ledger.mark_to_market(TimeMs::new(1), &marks("10"));

        assert_eq!(ledger.equity_curve().len(), 2);
        assert_eq!(ledger.equity_curve()[1].cash, d("900"));
        // The pre-trade mark still counted towards drawdown tracking.
        assert!((ledger.max_drawdown() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_curve_starts_with_opening_balance() {
        let ledger = Ledger::new(d("5000"));
        let first = &ledger.equity_curve()[0];
        assert_eq!(first.ts, None);
        assert_eq!(first.equity, d("5000"));
    }
}
