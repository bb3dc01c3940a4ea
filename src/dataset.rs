//! CSV dataset loading and validation.
//!
//! Layout: a `timestamp` (or `date`) column, one closing-price column per
//! asset, and optional `<ASSET>_volume` columns. Timestamps may be epoch
//! milliseconds, RFC 3339, or `YYYY-MM-DD`.

use crate::domain::{AssetId, Dataset, Decimal, PricePoint, PriceSeries, SeriesError, TimeMs};
use chrono::{DateTime, NaiveDate};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Rows a dataset needs before it is used for false-positive analysis.
pub const MIN_FP_STUDY_ROWS: usize = 200;

const VOLUME_SUFFIX: &str = "_volume";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {0}")]
    NotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("missing timestamp column (expected 'timestamp' or 'date')")]
    MissingTimestampColumn,
    #[error("missing price column for asset {0}")]
    MissingAssetColumn(String),
    #[error("no asset columns in dataset")]
    NoAssetColumns,
    #[error("empty cell at line {line}, column {column}")]
    EmptyCell { line: usize, column: String },
    #[error("invalid number '{value}' at line {line}, column {column}")]
    InvalidNumber {
        line: usize,
        column: String,
        value: String,
    },
    #[error("invalid timestamp '{value}' at line {line}")]
    InvalidTimestamp { line: usize, value: String },
    #[error("dataset {name} has {rows} rows, at least {min} required")]
    TooFewRows {
        name: String,
        rows: usize,
        min: usize,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Load a dataset from a CSV file, named after the file stem.
///
/// With `assets` set, exactly those price columns are read and each must
/// exist; otherwise every non-timestamp, non-volume column is an asset.
pub fn load_dataset(path: &Path, assets: Option<&[AssetId]>) -> Result<Dataset, DatasetError> {
    if !path.is_file() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());

    let file = File::open(path)?;
    let dataset = from_reader(&name, file, assets)?;
    info!(
        "Loaded dataset {} from {} ({} assets, {} rows)",
        name,
        path.display(),
        dataset.assets().count(),
        dataset.row_count()
    );
    Ok(dataset)
}

/// Load every `*.csv` file in `dir`, in file name order.
pub fn load_dir(dir: &Path) -> Result<Vec<Dataset>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::NotFound(dir.to_path_buf()));
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    paths.sort();

    paths.iter().map(|p| load_dataset(p, None)).collect()
}

/// Parse CSV content into a dataset.
pub fn from_reader<R: Read>(
    name: &str,
    reader: R,
    assets: Option<&[AssetId]>,
) -> Result<Dataset, DatasetError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let lower: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let ts_col = lower
        .iter()
        .position(|h| h == "timestamp")
        .or_else(|| lower.iter().position(|h| h == "date"))
        .ok_or(DatasetError::MissingTimestampColumn)?;

    let price_cols: Vec<(AssetId, usize)> = match assets {
        Some(wanted) => wanted
            .iter()
            .map(|asset| {
                headers
                    .iter()
                    .position(|h| h == asset.as_str())
                    .map(|i| (asset.clone(), i))
                    .ok_or_else(|| DatasetError::MissingAssetColumn(asset.to_string()))
            })
            .collect::<Result<_, _>>()?,
        None => headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != ts_col && !h.to_ascii_lowercase().ends_with(VOLUME_SUFFIX))
            .map(|(i, h)| (AssetId::new(h), i))
            .collect(),
    };
    if price_cols.is_empty() {
        return Err(DatasetError::NoAssetColumns);
    }

    let volume_cols: HashMap<AssetId, usize> = price_cols
        .iter()
        .filter_map(|(asset, _)| {
            let wanted = format!("{}{}", asset.as_str(), VOLUME_SUFFIX).to_ascii_lowercase();
            lower
                .iter()
                .position(|h| *h == wanted)
                .map(|i| (asset.clone(), i))
        })
        .collect();

    let mut points: HashMap<AssetId, Vec<PricePoint>> = HashMap::new();
    for (row_idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = row_idx + 2;

        let raw_ts = cell(&record, ts_col, &headers, line)?;
        let ts = parse_timestamp(raw_ts).ok_or_else(|| DatasetError::InvalidTimestamp {
            line,
            value: raw_ts.to_string(),
        })?;

        for (asset, col) in &price_cols {
            let price = number(&record, *col, &headers, line)?;
            let mut point = PricePoint::new(ts, price);
            if let Some(vcol) = volume_cols.get(asset) {
                point = point.with_volume(number(&record, *vcol, &headers, line)?);
            }
            points.entry(asset.clone()).or_default().push(point);
        }
    }
    debug!("Parsed dataset {} with {} price columns", name, price_cols.len());

    let series = price_cols
        .into_iter()
        .map(|(asset, _)| {
            let pts = points.remove(&asset).unwrap_or_default();
            PriceSeries::new(asset, pts)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Dataset::new(name, series)?)
}

/// Reject datasets too short for false-positive analysis.
pub fn validate_for_fp_study(dataset: &Dataset) -> Result<(), DatasetError> {
    let rows = dataset.row_count();
    if rows < MIN_FP_STUDY_ROWS {
        return Err(DatasetError::TooFewRows {
            name: dataset.name().to_string(),
            rows,
            min: MIN_FP_STUDY_ROWS,
        });
    }
    Ok(())
}

/// Epoch milliseconds, RFC 3339, or a bare `YYYY-MM-DD` date (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<TimeMs> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(TimeMs::new(ms));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(TimeMs::new(dt.timestamp_millis()));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(TimeMs::new(midnight.and_utc().timestamp_millis()))
}

fn cell<'r>(
    record: &'r csv::StringRecord,
    col: usize,
    headers: &csv::StringRecord,
    line: usize,
) -> Result<&'r str, DatasetError> {
    match record.get(col) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DatasetError::EmptyCell {
            line,
            column: headers.get(col).unwrap_or_default().to_string(),
        }),
    }
}

fn number(
    record: &csv::StringRecord,
    col: usize,
    headers: &csv::StringRecord,
    line: usize,
) -> Result<Decimal, DatasetError> {
    let raw = cell(record, col, headers, line)?;
    Decimal::from_str_canonical(raw).map_err(|_| DatasetError::InvalidNumber {
        line,
        column: headers.get(col).unwrap_or_default().to_string(),
        value: raw.to_string(),
    })
}
