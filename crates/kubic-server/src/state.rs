use kubic_core::config::Config;
use kubic_core::runner::CommandRunner;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Finished runs kept in the registry; older ones are dropped first.
pub const MAX_FINISHED_RUNS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    MasterInit,
    NodeJoin,
    Deploy,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// One inbound workflow invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub kind: RunKind,
    pub target: String,
    pub status: RunStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    /// Terminal status message, once finished.
    pub message: Option<String>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: Arc<dyn CommandRunner>,
    pub runs: Arc<RwLock<Vec<RunRecord>>>,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            runs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn start_run(&self, kind: RunKind, target: impl Into<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let record = RunRecord {
            id: id.clone(),
            kind,
            target: target.into(),
            status: RunStatus::Running,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            message: None,
        };
        self.runs.write().await.push(record);
        id
    }

    pub async fn finish_run(&self, id: &str, status: RunStatus, message: Option<String>) {
        let mut runs = self.runs.write().await;
        if let Some(record) = runs.iter_mut().find(|r| r.id == id) {
            record.status = status;
            record.completed_at = Some(chrono::Utc::now().to_rfc3339());
            record.message = message;
        }
        prune_finished(&mut runs);
    }
}

/// Drop the oldest finished records beyond the cap. Running ones always stay.
fn prune_finished(runs: &mut Vec<RunRecord>) {
    let finished = runs
        .iter()
        .filter(|r| r.status != RunStatus::Running)
        .count();
    let mut excess = finished.saturating_sub(MAX_FINISHED_RUNS);
    runs.retain(|r| {
        if excess > 0 && r.status != RunStatus::Running {
            excess -= 1;
            false
        } else {
            true
        }
    });
}
