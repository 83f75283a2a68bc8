use axum::extract::State;
use axum::Json;

use crate::state::{AppState, RunRecord};

/// GET /api/runs: every workflow started by this server, oldest first.
pub async fn list_runs(State(app): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(app.runs.read().await.clone())
}
