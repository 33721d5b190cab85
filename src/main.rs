use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use learnserver::config::AppConfig;
use learnserver::shared::state::AppState;
use learnserver::shared::utils::create_pool;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learnserver=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = create_pool(&config.database_url())?;
    let state = Arc::new(AppState::new(pool));

    let app = learnserver::api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "learnserver listening");

    axum::serve(listener, app)
        .await
        .context("server exited with error")
}
