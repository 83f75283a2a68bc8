use axum::extract::State;
use axum::Json;
use kubic_core::node_join::{JoinStep, NodeJoinWorkflow, TargetSpec};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::{AppState, RunKind, RunStatus};

#[derive(Debug, Deserialize)]
pub struct JoinBody {
    pub targets: String,
    /// Sub-steps a previous attempt already finished on these targets.
    #[serde(default)]
    pub completed: Vec<JoinStep>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub success: bool,
    pub message: String,
    pub targets: TargetSpec,
    pub completed: Vec<JoinStep>,
}

/// POST /api/nodes: join worker nodes.
pub async fn join_nodes(
    State(app): State<AppState>,
    Json(body): Json<JoinBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let spec = TargetSpec::parse(&body.targets)?;
    let run_id = app.start_run(RunKind::NodeJoin, spec.to_string()).await;

    let config = app.config.clone();
    let runner = app.runner.clone();
    let report = tokio::task::spawn_blocking(move || {
        NodeJoinWorkflow::new(runner.as_ref(), &config).join_resuming(&spec, &body.completed)
    })
    .await?;

    let status = if report.result.success {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };
    app.finish_run(&run_id, status, Some(report.result.message.clone()))
        .await;

    Ok(Json(JoinResponse {
        success: report.result.success,
        message: report.result.message,
        targets: report.targets,
        completed: report.completed,
    }))
}
