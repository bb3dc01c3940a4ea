pub mod decide;
pub mod health;
pub mod scenarios;

use crate::config::{Config, EngineMode};
use crate::db::Repository;
use crate::orchestration::Orchestrator;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            repo,
            config,
            orchestrator,
        }
    }
}

/// Registry name used when a request names no decision source.
pub(crate) fn default_source(config: &Config) -> &'static str {
    match config.engine_mode {
        EngineMode::Mock => "momentum",
        EngineMode::Live => "remote",
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/signal", post(decide::signal))
        .route("/v1/filter", post(decide::filter))
        .route("/v1/regime", post(decide::regime))
        .route(
            "/v1/scenarios",
            post(scenarios::run_scenarios).get(scenarios::list_runs),
        )
        .route("/v1/scenarios/:run_id", get(scenarios::get_run))
        .route("/v1/scenarios/:run_id/rows", get(scenarios::get_rows))
        .route("/v1/scenarios/:run_id/report", get(scenarios::get_markdown))
        .route("/v1/scenarios/:run_id/blocks.csv", get(scenarios::get_blocks_csv))
        .route("/v1/stress", get(scenarios::run_stress))
        .layer(cors)
        .with_state(state)
}
