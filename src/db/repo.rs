//! Repository layer for stored scenario runs.

use crate::domain::Decimal;
use crate::engine::compare::rsa_from_metrics;
use crate::engine::ScenarioResult;
use crate::orchestration::CorpusReport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::io::{Read, Write};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lz4 error: {0}")]
    Lz4(String),
    #[error("invalid stored value in {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// One stored run, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub dataset_count: i64,
    pub created_at: i64,
}

/// Summary columns of one stored scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub run_id: String,
    pub dataset: String,
    pub dataset_fingerprint: String,
    pub scenario_id: String,
    pub policy: String,
    pub final_equity: Decimal,
    pub max_drawdown: f64,
    pub total_trades: i64,
    pub blocked_trades: i64,
    pub rsa: Option<f64>,
}

fn compress<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder
        .write_all(&json)
        .map_err(|e| StoreError::Lz4(e.to_string()))?;
    encoder.finish().map_err(|e| StoreError::Lz4(e.to_string()))
}

fn decompress<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| StoreError::Lz4(e.to_string()))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Round-trip a trivial query to confirm the database is reachable.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Store a completed corpus run and every scenario in it.
    ///
    /// Either the whole run is written or nothing is.
    ///
    /// # Errors
    /// Returns an error if serialization or the transaction fails.
    pub async fn insert_run(&self, report: &CorpusReport) -> Result<String, StoreError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO runs (run_id, source, dataset_count, report, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(report.source.as_str())
        .bind(report.datasets.len() as i64)
        .bind(compress(report)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut stored = 0usize;
        for dataset in &report.datasets {
            let results = std::iter::once(&dataset.baseline)
                .chain(dataset.treatments.iter())
                .chain(dataset.hedge.iter());
            for result in results {
                sqlx::query(
                    r#"
                    INSERT INTO scenario_runs (
                        run_id, dataset, dataset_fingerprint, scenario_id, policy,
                        final_equity, max_drawdown, total_trades, blocked_trades, rsa,
                        payload, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(run_id.as_str())
                .bind(result.dataset.as_str())
                .bind(result.dataset_fingerprint.as_str())
                .bind(result.scenario_id.as_str())
                .bind(result.policy.as_str())
                .bind(result.metrics.final_equity.to_canonical_string())
                .bind(result.metrics.max_drawdown)
                .bind(result.metrics.total_trades as i64)
                .bind(result.blocked_count() as i64)
                .bind(rsa_from_metrics(&result.metrics).ok())
                .bind(compress(result)?)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                stored += 1;
            }
        }

        tx.commit().await?;
        info!("Stored run {} with {} scenarios", run_id, stored);
        Ok(run_id)
    }

    /// Full corpus report of a stored run.
    ///
    /// # Errors
    /// Returns an error if the query fails or the payload is unreadable.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<CorpusReport>, StoreError> {
        let row = sqlx::query("SELECT report FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let bytes: Vec<u8> = row.get("report");
                Ok(Some(decompress(&bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Most recent runs first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RunSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, source, dataset_count, created_at
            FROM runs
            ORDER BY created_at DESC, run_id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RunSummary {
                run_id: row.get("run_id"),
                source: row.get("source"),
                dataset_count: row.get("dataset_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Summary rows of a run, in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored equity is not a decimal.
    pub async fn list_scenarios(&self, run_id: &str) -> Result<Vec<ScenarioRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, dataset, dataset_fingerprint, scenario_id, policy,
                   final_equity, max_drawdown, total_trades, blocked_trades, rsa
            FROM scenario_runs
            WHERE run_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let equity: String = row.get("final_equity");
            let final_equity =
                Decimal::from_str_canonical(&equity).map_err(|_| StoreError::Corrupt {
                    column: "final_equity",
                    value: equity.clone(),
                })?;
            out.push(ScenarioRow {
                run_id: row.get("run_id"),
                dataset: row.get("dataset"),
                dataset_fingerprint: row.get("dataset_fingerprint"),
                scenario_id: row.get("scenario_id"),
                policy: row.get("policy"),
                final_equity,
                max_drawdown: row.get("max_drawdown"),
                total_trades: row.get("total_trades"),
                blocked_trades: row.get("blocked_trades"),
                rsa: row.get("rsa"),
            });
        }
        Ok(out)
    }

    /// Full result of one scenario within a run.
    ///
    /// # Errors
    /// Returns an error if the query fails or the payload is unreadable.
    pub async fn get_scenario(
        &self,
        run_id: &str,
        dataset: &str,
        scenario_id: &str,
    ) -> Result<Option<ScenarioResult>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT payload FROM scenario_runs
            WHERE run_id = ? AND dataset = ? AND scenario_id = ?
            "#,
        )
        .bind(run_id)
        .bind(dataset)
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let bytes: Vec<u8> = row.get("payload");
                Ok(Some(decompress(&bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Delete a run and, through the foreign key, its scenarios.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_run(&self, run_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM runs WHERE run_id = ?")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
