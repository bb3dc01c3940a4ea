use crate::api::AppState;
use crate::config::EngineMode;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mode = match state.config.engine_mode {
        EngineMode::Mock => "MOCK",
        EngineMode::Live => "LIVE",
    };
    Json(serde_json::json!({
        "status": "ok",
        "engine_mode": mode,
        "sources": state.orchestrator.registry().names(),
    }))
}

/// Ready once the results database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.ping().await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}
