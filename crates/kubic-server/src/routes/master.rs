use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use kubic_core::master_init::{InitOutcome, InitRequest, MasterInitWorkflow};
use kubic_core::probe::MarkerFileProbe;
use kubic_core::reset;
use kubic_core::runner::StepResult;
use kubic_core::status::{Disconnected, StatusMessage, StatusSink};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::{AppState, RunKind, RunStatus};

/// Forwards workflow status into the SSE channel, remembering the last one.
struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusMessage>,
    last: Option<StatusMessage>,
}

impl StatusSink for ChannelSink {
    fn send(&mut self, status: StatusMessage) -> Result<(), Disconnected> {
        self.last = Some(status.clone());
        self.tx.send(status).map_err(|_| Disconnected)
    }
}

fn run_status(outcome: InitOutcome) -> RunStatus {
    match outcome {
        InitOutcome::Completed => RunStatus::Succeeded,
        InitOutcome::Rejected | InitOutcome::Failed { .. } => RunStatus::Failed,
        InitOutcome::Cancelled => RunStatus::Cancelled,
    }
}

/// POST /api/master/init: stream `status` events until the workflow ends.
pub async fn init_master(
    State(app): State<AppState>,
    Json(request): Json<InitRequest>,
) -> impl IntoResponse {
    let target = if request.pod_network.is_empty() {
        "flannel".to_string()
    } else {
        request.pod_network.clone()
    };
    let run_id = app.start_run(RunKind::MasterInit, target).await;
    info!(run_id = %run_id, "master init requested");

    let (tx, rx) = mpsc::unbounded_channel();
    let config = app.config.clone();
    let runner = app.runner.clone();
    let task = tokio::task::spawn_blocking(move || {
        let probe = MarkerFileProbe::new(&config);
        let mut sink = ChannelSink { tx, last: None };
        let report =
            MasterInitWorkflow::new(runner.as_ref(), &config, &probe).run(&request, &mut sink);
        (report, sink.last)
    });

    let registry = app.clone();
    tokio::spawn(async move {
        match task.await {
            Ok((report, last)) => {
                info!(
                    run_id = %run_id,
                    stage = %report.stage,
                    outcome = ?report.outcome,
                    "master init finished"
                );
                registry
                    .finish_run(&run_id, run_status(report.outcome), last.map(|s| s.message))
                    .await;
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "master init worker died");
                registry
                    .finish_run(&run_id, RunStatus::Failed, Some(e.to_string()))
                    .await;
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|status| Event::default().event("status").json_data(status));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// POST /api/master/reset: tear the control plane down.
pub async fn reset_master(State(app): State<AppState>) -> Result<Json<StepResult>, AppError> {
    let run_id = app.start_run(RunKind::Reset, "localhost").await;
    let config = app.config.clone();
    let runner = app.runner.clone();
    let result =
        tokio::task::spawn_blocking(move || reset::reset_master(runner.as_ref(), &config)).await?;

    let status = if result.success {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };
    app.finish_run(&run_id, status, Some(result.message.clone()))
        .await;
    Ok(Json(result))
}
