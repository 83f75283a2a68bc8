use axum::http::StatusCode;
use http_body_util::BodyExt;
use kubic_core::config::Config;
use kubic_core::runner::{CommandRunner, RecordingRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A config whose every host path lives inside `dir`, with stock manifests present.
fn host_config(dir: &TempDir) -> Config {
    let root = dir.path();
    std::fs::create_dir_all(root.join("manifests")).unwrap();
    let mut config = Config {
        manifests_dir: root.join("manifests"),
        admin_kubeconfig: root.join("admin.conf"),
        deployment_store: root.join("state/k8s-yaml.conf"),
        flannel_manifest: root.join("kube-flannel.yaml"),
        cilium_manifest: root.join("cilium.yaml"),
        kured_manifest: root.join("kured.yaml"),
        ..Config::default()
    };
    config.reboot.path = root.join("transactional-update.conf");
    for manifest in [
        &config.flannel_manifest,
        &config.cilium_manifest,
        &config.kured_manifest,
    ] {
        std::fs::write(manifest, "kind: DaemonSet\n").unwrap();
    }
    config
}

fn app(config: Config, runner: &Arc<RecordingRunner>) -> axum::Router {
    let runner: Arc<dyn CommandRunner> = runner.clone();
    kubic_server::build_router(config, runner)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body and return (status, raw body text).
async fn post_raw(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, String) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let (status, text) = post_raw(app, uri, body).await;
    let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Collect the JSON payloads of every `data:` line in an SSE body.
fn sse_payloads(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Master init
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_streams_status_until_master_ready() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let (status, body) = post_raw(
        app(host_config(&dir), &runner),
        "/api/master/init",
        serde_json::json!({ "pod_network": "flannel" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: status"));
    let messages = sse_payloads(&body);
    assert_eq!(messages[0]["message"], "Enable and start crio");
    let last = messages.last().unwrap();
    assert_eq!(last["success"], true);
    assert_eq!(last["message"], kubic_core::master_init::MASTER_READY);
    assert_eq!(runner.count(&["kubeadm", "init"]), 1);
}

#[tokio::test]
async fn init_rejects_unsupported_network_without_commands() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let (status, body) = post_raw(
        app(host_config(&dir), &runner),
        "/api/master/init",
        serde_json::json!({ "pod_network": "weave" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let messages = sse_payloads(&body);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["success"], false);
    assert_eq!(
        messages[0]["message"],
        "Unsupported pod network, please use 'flannel' or 'cilium'"
    );
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn init_failure_is_recorded_as_failed_run() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().fail_on(&["kubeadm", "init"], "preflight errors"));
    let router = app(host_config(&dir), &runner);

    let (_, body) = post_raw(
        router.clone(),
        "/api/master/init",
        serde_json::json!({ "pod_network": "cilium" }),
    )
    .await;
    let last = sse_payloads(&body).pop().unwrap();
    assert_eq!(last["success"], false);
    assert!(last["message"].as_str().unwrap().starts_with("preflight errors"));
    assert_eq!(runner.count(&["kubeadm", "reset"]), 1);

    // The run record is finalized by a detached task once the stream closes.
    let mut runs = serde_json::Value::Null;
    for _ in 0..50 {
        let (_, json) = get(router.clone(), "/api/runs").await;
        if json[0]["status"] != "running" {
            runs = json;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(runs[0]["kind"], "master_init");
    assert_eq!(runs[0]["target"], "cilium");
    assert_eq!(runs[0]["status"], "failed");
}

// ---------------------------------------------------------------------------
// Reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_runs_kubeadm_reset() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let (status, json) = post_json(
        app(host_config(&dir), &runner),
        "/api/master/reset",
        serde_json::json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(runner.count(&["kubeadm", "reset", "--force"]), 1);
}

// ---------------------------------------------------------------------------
// Node join
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_empty_targets_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let (status, json) = post_json(
        app(host_config(&dir), &runner),
        "/api/nodes",
        serde_json::json!({ "targets": "  " }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn join_list_of_nodes_reports_all_steps() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new().reply_with(
        &["kubeadm", "token", "create"],
        "kubeadm join 10.0.0.1:6443 --token abc",
    ));
    let (status, json) = post_json(
        app(host_config(&dir), &runner),
        "/api/nodes",
        serde_json::json!({ "targets": "node1, node2" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["targets"]["type"], "explicit_list");
    assert_eq!(json["completed"].as_array().unwrap().len(), 6);
    let salt_calls: Vec<Vec<String>> = runner
        .calls()
        .into_iter()
        .filter(|argv| argv[0] == "salt")
        .collect();
    assert!(salt_calls.iter().all(|argv| argv[1] == "-L" && argv[2] == "node1,node2"));
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deploy_records_digest_and_lists_it() {
    let dir = TempDir::new().unwrap();
    let config = host_config(&dir);
    let manifest = dir.path().join("app.yaml");
    std::fs::write(&manifest, "kind: Deployment\n").unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let router = app(config.clone(), &runner);

    let (status, json) = post_json(
        router.clone(),
        "/api/deployments",
        serde_json::json!({ "path": manifest }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(config.deployment_store.exists());

    let (status, json) = get(router, "/api/deployments").await;
    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["path"], manifest.display().to_string());
    assert_eq!(records[0]["status"], "current");
}

#[tokio::test]
async fn deploy_apply_failure_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let config = host_config(&dir);
    let runner = Arc::new(RecordingRunner::new().fail_on(&["kubectl"], "connection refused"));

    let (status, json) = post_json(
        app(config.clone(), &runner),
        "/api/deployments",
        serde_json::json!({ "path": PathBuf::from("/nonexistent.yaml") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "connection refused");
    assert!(!config.deployment_store.exists());
}

#[tokio::test]
async fn runs_start_empty() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::new());
    let (status, json) = get(app(host_config(&dir), &runner), "/api/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}
