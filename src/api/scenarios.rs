//! Run scenario plans over inline CSV datasets, read stored runs back and run
//! the stress suite.

use crate::api::{default_source, AppState};
use crate::dataset::from_reader;
use crate::db::{RunSummary, ScenarioRow};
use crate::domain::AssetId;
use crate::error::AppError;
use crate::orchestration::{CorpusReport, ScenarioPlan, StressReport};
use crate::report::{markdown_summary, write_block_events_csv};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct InlineDataset {
    pub name: String,
    /// CSV with a `timestamp` or `date` column and one price column per asset.
    pub csv: String,
    #[serde(default)]
    pub assets: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub datasets: Vec<InlineDataset>,
    #[serde(default)]
    pub plan: ScenarioPlan,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub report: CorpusReport,
}

pub async fn run_scenarios(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, AppError> {
    if req.datasets.is_empty() {
        return Err(AppError::BadRequest("at least one dataset is required".into()));
    }

    let mut datasets = Vec::with_capacity(req.datasets.len());
    for inline in &req.datasets {
        let assets: Option<Vec<AssetId>> = inline
            .assets
            .as_ref()
            .map(|names| names.iter().map(|a| AssetId::new(a.as_str())).collect());
        datasets.push(from_reader(
            &inline.name,
            inline.csv.as_bytes(),
            assets.as_deref(),
        )?);
    }

    let report = state
        .orchestrator
        .run_corpus_concurrent(&req.plan, &datasets)
        .await?;
    let run_id = state.repo.insert_run(&report).await?;
    info!("Scenario run {} stored", run_id);

    Ok(Json(RunResponse { run_id, report }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_runs(
    Query(params): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<RunSummary>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIST_LIMIT
        )));
    }
    Ok(Json(state.repo.list_runs(limit).await?))
}

async fn load_run(state: &AppState, run_id: &str) -> Result<CorpusReport, AppError> {
    state
        .repo
        .get_run(run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("run {}", run_id)))
}

pub async fn get_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CorpusReport>, AppError> {
    Ok(Json(load_run(&state, &run_id).await?))
}

pub async fn get_rows(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ScenarioRow>>, AppError> {
    let rows = state.repo.list_scenarios(&run_id).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(format!("run {}", run_id)));
    }
    Ok(Json(rows))
}

pub async fn get_markdown(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_run(&state, &run_id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown_summary(&report),
    ))
}

/// Every classified block event of a stored run.
pub async fn get_blocks_csv(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_run(&state, &run_id).await?;
    let mut body = Vec::new();
    write_block_events_csv(&report, &mut body)
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}

#[derive(Debug, Deserialize)]
pub struct StressQuery {
    pub source: Option<String>,
}

pub async fn run_stress(
    Query(params): Query<StressQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StressReport>>, AppError> {
    let source = params
        .source
        .as_deref()
        .unwrap_or_else(|| default_source(&state.config));
    let reports = state.orchestrator.run_stress_tests(source).await?;
    info!(
        "Stress suite on {}: {}/{} passed",
        source,
        reports.iter().filter(|r| r.passed).count(),
        reports.len()
    );
    Ok(Json(reports))
}
