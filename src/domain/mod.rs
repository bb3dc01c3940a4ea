//! Domain types for the scenario simulator.
//!
//! This module provides:
//! - Fixed-point money via the Decimal wrapper
//! - Primitives: TimeMs, AssetId, Side, Action, Regime
//! - Validated price series and datasets with content fingerprints
//! - Positions, trades and equity snapshots recorded by the ledger

pub mod decimal;
pub mod primitives;
pub mod series;
pub mod trade;

pub use decimal::Decimal;
pub use primitives::{Action, AssetId, ParseLabelError, Regime, Side, TimeMs};
pub use series::{Dataset, PricePoint, PriceSeries, SeriesError};
pub use trade::{EquityPoint, Position, Trade};
