/*
 * Responsibility
 * - Config読み込み → 依存生成 → Router 組み立て
 * - Middleware の適用 (HTTP 層 / Authorization)
 * - axum::serve() で起動
 */
use anyhow::Result;
use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::{api, config::Config, middleware, services, state::AppState};

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let verifier = services::auth::build_verifier(&config)?;
    let state = AppState::new(verifier);

    let app = middleware::http::apply(build_router(state));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api::v1::routes(state.clone()))
        .with_state(state)
}

fn init_tracing(config: &Config) {
    let default = if config.app_env.is_production() {
        "info"
    } else {
        "debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
