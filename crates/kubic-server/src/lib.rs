pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use kubic_core::config::Config;
use kubic_core::runner::CommandRunner;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(config: Config, runner: Arc<dyn CommandRunner>) -> Router {
    let app_state = state::AppState::new(config, runner);

    Router::new()
        // Master
        .route("/api/master/init", post(routes::master::init_master))
        .route("/api/master/reset", post(routes::master::reset_master))
        // Worker nodes
        .route("/api/nodes", post(routes::nodes::join_nodes))
        // Deployments
        .route("/api/deployments", post(routes::deployments::deploy))
        .route("/api/deployments", get(routes::deployments::list_deployments))
        // Runs
        .route("/api/runs", get(routes::runs::list_runs))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the control daemon on `0.0.0.0:{port}`.
pub async fn serve(
    config: Config,
    runner: Arc<dyn CommandRunner>,
    port: u16,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(config, runner, listener).await
}

/// Start the control daemon on a pre-bound listener.
///
/// The caller can read the actual port before starting when `port = 0`.
pub async fn serve_on(
    config: Config,
    runner: Arc<dyn CommandRunner>,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(config, runner);

    tracing::info!("kubic control daemon listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
