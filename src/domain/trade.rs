//! Positions, executed trades and equity snapshots.

use crate::domain::{AssetId, Decimal, Side, TimeMs};
use serde::{Deserialize, Serialize};

/// An open long position. At most one exists per asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub asset: AssetId,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub entry_ts: TimeMs,
}

impl Position {
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.size
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.entry_price) * self.size
    }
}

/// Immutable record of an executed fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub asset: AssetId,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub ts: TimeMs,
    /// Realized P&L, SELL only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,
    /// Realized P&L relative to entry notional, in percent. SELL only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_percent: Option<Decimal>,
    pub execution_cost: Decimal,
    /// Ledger equity right after the fill settled.
    pub equity_after: Decimal,
}

impl Trade {
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    pub fn is_winner(&self) -> bool {
        self.pnl.map(|p| p.is_positive()).unwrap_or(false)
    }
}

/// One mark-to-market observation. `ts` is `None` for the opening balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: Option<TimeMs>,
    pub cash: Decimal,
    pub unrealized: Decimal,
    pub equity: Decimal,
}
