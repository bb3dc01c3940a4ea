//! Price series and datasets replayed by the simulator.

use crate::domain::{AssetId, Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// One observation of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: TimeMs,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl PricePoint {
    pub fn new(ts: TimeMs, price: Decimal) -> Self {
        Self {
            ts,
            price,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("series for {0} is empty")]
    Empty(AssetId),
    #[error("non-positive price {price} for {asset} at {ts}")]
    NonPositivePrice {
        asset: AssetId,
        ts: TimeMs,
        price: Decimal,
    },
    #[error("timestamps for {asset} are not strictly increasing at {ts}")]
    NonIncreasingTimestamp { asset: AssetId, ts: TimeMs },
    #[error("duplicate series for asset {0}")]
    DuplicateAsset(AssetId),
    #[error("dataset {0} has no series")]
    EmptyDataset(String),
}

/// Validated, immutable price history of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceSeries {
    asset: AssetId,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, rejecting empty input, non-positive prices and
    /// timestamps that do not strictly increase.
    pub fn new(asset: AssetId, points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        if points.is_empty() {
            return Err(SeriesError::Empty(asset));
        }

        let mut prev: Option<TimeMs> = None;
        for point in &points {
            if !point.price.is_positive() {
                return Err(SeriesError::NonPositivePrice {
                    asset,
                    ts: point.ts,
                    price: point.price,
                });
            }
            if let Some(prev) = prev {
                if point.ts <= prev {
                    return Err(SeriesError::NonIncreasingTimestamp {
                        asset,
                        ts: point.ts,
                    });
                }
            }
            prev = Some(point.ts);
        }

        Ok(Self { asset, points })
    }

    /// Convenience constructor for closing prices on a fixed spacing.
    pub fn from_closes(
        asset: AssetId,
        start: TimeMs,
        step_ms: i64,
        closes: &[Decimal],
    ) -> Result<Self, SeriesError> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, px)| PricePoint::new(TimeMs::new(start.as_ms() + step_ms * i as i64), *px))
            .collect();
        Self::new(asset, points)
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the point at exactly `ts`.
    pub fn index_of(&self, ts: TimeMs) -> Option<usize> {
        self.points.binary_search_by_key(&ts, |p| p.ts).ok()
    }

    pub fn price_at(&self, ts: TimeMs) -> Option<Decimal> {
        self.index_of(ts).map(|i| self.points[i].price)
    }

    /// The trailing `lookback` points ending at and including `ts`.
    pub fn window_ending_at(&self, ts: TimeMs, lookback: usize) -> &[PricePoint] {
        let end = self.points.partition_point(|p| p.ts <= ts);
        let start = end.saturating_sub(lookback);
        &self.points[start..end]
    }

    fn hash_into(&self, hasher: &mut sha2::Sha256) {
        use sha2::Digest;

        hasher.update((self.asset.as_str().len() as u32).to_le_bytes());
        hasher.update(self.asset.as_str().as_bytes());
        for point in &self.points {
            hasher.update(point.ts.as_ms().to_le_bytes());
            let px = point.price.to_canonical_string();
            hasher.update((px.len() as u32).to_le_bytes());
            hasher.update(px.as_bytes());
            match point.volume {
                Some(v) => {
                    let v = v.to_canonical_string();
                    hasher.update((v.len() as u32).to_le_bytes());
                    hasher.update(v.as_bytes());
                }
                None => hasher.update(0u32.to_le_bytes()),
            }
        }
    }
}

/// Extract the closing prices of a window.
pub fn closes(points: &[PricePoint]) -> Vec<Decimal> {
    points.iter().map(|p| p.price).collect()
}

/// Extract volumes of a window when every point carries one.
pub fn volumes(points: &[PricePoint]) -> Option<Vec<Decimal>> {
    points.iter().map(|p| p.volume).collect()
}

/// A named collection of series, at most one per asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    name: String,
    series: BTreeMap<AssetId, PriceSeries>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, series: Vec<PriceSeries>) -> Result<Self, SeriesError> {
        let name = name.into();
        if series.is_empty() {
            return Err(SeriesError::EmptyDataset(name));
        }

        let mut by_asset = BTreeMap::new();
        for s in series {
            let asset = s.asset.clone();
            if by_asset.insert(asset.clone(), s).is_some() {
                return Err(SeriesError::DuplicateAsset(asset));
            }
        }

        Ok(Self {
            name,
            series: by_asset,
        })
    }

    pub fn single(name: impl Into<String>, series: PriceSeries) -> Self {
        let mut by_asset = BTreeMap::new();
        by_asset.insert(series.asset.clone(), series);
        Self {
            name: name.into(),
            series: by_asset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.series.keys()
    }

    pub fn series(&self, asset: &AssetId) -> Option<&PriceSeries> {
        self.series.get(asset)
    }

    pub fn all_series(&self) -> impl Iterator<Item = &PriceSeries> {
        self.series.values()
    }

    /// Sorted union of every series' timestamps.
    pub fn timeline(&self) -> Vec<TimeMs> {
        let set: BTreeSet<TimeMs> = self
            .series
            .values()
            .flat_map(|s| s.points.iter().map(|p| p.ts))
            .collect();
        set.into_iter().collect()
    }

    /// Number of rows in the longest series.
    pub fn row_count(&self) -> usize {
        self.series.values().map(|s| s.len()).max().unwrap_or(0)
    }

    /// Content fingerprint used to tie results back to their input.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        for series in self.series.values() {
            series.hash_into(&mut hasher);
        }
        let hash = hasher.finalize();
        format!("sha256:{}", hex::encode(&hash[..16]))
    }
}
