//! Single-shot endpoints over the decision sources, the gate and the regime classifier.

use crate::api::{default_source, AppState};
use crate::decision::{decide_with_fallback, DecisionOutcome, MomentumSource};
use crate::domain::{Action, AssetId, Decimal, Regime};
use crate::engine::gate::evaluate;
use crate::engine::{
    GateConfig, GateReason, MarketRegime, Rail, RegimeClassifier, RegimeFeatures, RiskSnapshot,
};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub asset: String,
    pub prices: Vec<Decimal>,
    #[serde(default)]
    pub volumes: Option<Vec<Decimal>>,
    /// Registry name; defaults to the configured engine mode.
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn signal(
    State(state): State<AppState>,
    Json(req): Json<SignalRequest>,
) -> Result<Json<DecisionOutcome>, AppError> {
    if req.prices.is_empty() {
        return Err(AppError::BadRequest("prices must not be empty".into()));
    }
    if let Some(volumes) = &req.volumes {
        if volumes.len() != req.prices.len() {
            return Err(AppError::BadRequest(
                "volumes must match prices in length".into(),
            ));
        }
    }

    let name = req
        .source
        .as_deref()
        .unwrap_or_else(|| default_source(&state.config));
    let source = state
        .orchestrator
        .registry()
        .require(name)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = decide_with_fallback(
        source.as_ref(),
        &MomentumSource::default(),
        &AssetId::new(req.asset.as_str()),
        &req.prices,
        req.volumes.as_deref(),
    )
    .await;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub action: Action,
    pub regime: Regime,
    pub confidence: f64,
    #[serde(default)]
    pub metrics: Option<RiskSnapshot>,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    /// Overrides the server's gate configuration.
    #[serde(default)]
    pub gate: Option<GateConfig>,
}

fn default_healthy() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub allowed: bool,
    pub reason: GateReason,
    pub rail: Option<Rail>,
}

pub async fn filter(
    State(state): State<AppState>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<FilterResponse>, AppError> {
    if !(0.0..=1.0).contains(&req.confidence) {
        return Err(AppError::BadRequest("confidence must be in [0, 1]".into()));
    }
    let gate = req.gate.unwrap_or_else(|| state.config.gate.clone());
    let decision = evaluate(
        &gate,
        req.action,
        req.regime,
        req.confidence,
        req.metrics.as_ref(),
        req.healthy,
    );
    Ok(Json(FilterResponse {
        allowed: decision.allowed,
        reason: decision.reason,
        rail: decision.reason.rail(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegimeRequest {
    pub prices: Vec<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct RegimeResponse {
    pub regime: MarketRegime,
    /// Absent below the classifier's minimum history.
    pub features: Option<RegimeFeatures>,
}

pub async fn regime(Json(req): Json<RegimeRequest>) -> Json<RegimeResponse> {
    let classifier = RegimeClassifier::default();
    Json(RegimeResponse {
        regime: classifier.classify(&req.prices),
        features: classifier.features(&req.prices),
    })
}
