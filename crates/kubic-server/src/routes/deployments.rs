use axum::extract::State;
use axum::Json;
use kubic_core::deployment::{DeploymentRecord, DeploymentTracker};
use kubic_core::runner::StepResult;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;
use crate::state::{AppState, RunKind, RunStatus};

#[derive(Debug, Deserialize)]
pub struct DeployBody {
    pub path: PathBuf,
}

/// POST /api/deployments: apply one manifest and record its digest.
pub async fn deploy(
    State(app): State<AppState>,
    Json(body): Json<DeployBody>,
) -> Result<Json<StepResult>, AppError> {
    let run_id = app
        .start_run(RunKind::Deploy, body.path.display().to_string())
        .await;
    let config = app.config.clone();
    let runner = app.runner.clone();
    let result = tokio::task::spawn_blocking(move || {
        DeploymentTracker::new(runner.as_ref(), &config).deploy(&body.path)
    })
    .await?;

    let status = if result.success {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };
    app.finish_run(&run_id, status, Some(result.message.clone()))
        .await;
    Ok(Json(result))
}

/// GET /api/deployments: recorded manifests and whether they changed since.
pub async fn list_deployments(
    State(app): State<AppState>,
) -> Result<Json<Vec<DeploymentRecord>>, AppError> {
    let config = app.config.clone();
    let runner = app.runner.clone();
    let records = tokio::task::spawn_blocking(move || {
        DeploymentTracker::new(runner.as_ref(), &config).records()
    })
    .await??;
    Ok(Json(records))
}
