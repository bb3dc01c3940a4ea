use anyhow::Context;
use shieldsim::decision::RemoteSource;
use shieldsim::orchestration::ConfigScope;
use shieldsim::{api, init_db, Config, DecisionRegistry, EngineMode, Orchestrator, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("initializing database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let mut registry = DecisionRegistry::with_builtins();
    if config.engine_mode == EngineMode::Live {
        let url = config
            .engine_api_url
            .clone()
            .context("ENGINE_API_URL is required in LIVE mode")?;
        registry
            .register("remote", Arc::new(RemoteSource::new(url)))
            .context("registering remote decision source")?;
    }

    // Scenario runs read their configuration from a snapshot, never the live environment.
    let orchestrator = Arc::new(Orchestrator::new(registry, ConfigScope::from_process_env()));
    let app = api::create_router(api::AppState::new(repo, config, orchestrator));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
