#![allow(deprecated)]
use assert_cmd::Command;
use kubic_core::config::Config;
use predicates::prelude::*;
use tempfile::TempDir;

/// Write a config rooted in `dir` and return a dry-run `kubicctl` using it.
fn kubicctl(dir: &TempDir) -> Command {
    let root = dir.path();
    std::fs::create_dir_all(root.join("manifests")).unwrap();
    let mut config = Config {
        manifests_dir: root.join("manifests"),
        admin_kubeconfig: root.join("admin.conf"),
        deployment_store: root.join("k8s-yaml.conf"),
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
    let config_path = root.join("kubicd.yaml");
    config.save(&config_path).unwrap();

    let mut cmd = Command::cargo_bin("kubicctl").unwrap();
    cmd.current_dir(root)
        .env("KUBIC_CONFIG", &config_path)
        .env_remove("RUST_LOG")
        .arg("--dry-run");
    cmd
}

// ---------------------------------------------------------------------------
// kubicctl init
// ---------------------------------------------------------------------------

#[test]
fn init_reports_master_ready() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enable and start crio"))
        .stdout(predicate::str::contains("Kubernetes master was succesfully setup."))
        .stderr(predicate::str::contains(
            "kubeadm init --cri-socket=/run/crio/crio.sock --pod-network-cidr=10.244.0.0/16",
        ));

    let reboot = std::fs::read_to_string(dir.path().join("transactional-update.conf")).unwrap();
    assert!(reboot.contains("REBOOT_METHOD=kured"));
}

#[test]
fn init_cilium_passes_version_without_pod_cidr() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .args(["init", "--pod-network", "Cilium", "--kubernetes-version", "1.28.2"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "kubeadm init --cri-socket=/run/crio/crio.sock --kubernetes-version=1.28.2",
        ))
        .stderr(predicate::str::contains("--pod-network-cidr").not());
}

#[test]
fn init_rejects_unsupported_network() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .args(["init", "--pod-network", "weave"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "error: Unsupported pod network, please use 'flannel' or 'cilium'",
        ))
        .stderr(predicate::str::contains("0 command(s) would run"));
}

#[test]
fn init_refuses_existing_control_plane() {
    let dir = TempDir::new().unwrap();
    let mut cmd = kubicctl(&dir);
    std::fs::write(dir.path().join("manifests/etcd.yaml"), "").unwrap();
    cmd.arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("kubeadm reset"))
        .stderr(predicate::str::contains("0 command(s) would run"));
}

#[test]
fn init_json_emits_one_status_per_line() {
    let dir = TempDir::new().unwrap();
    let output = kubicctl(&dir).args(["--json", "init"]).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let statuses: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(statuses.iter().all(|s| s["success"] == true));
    assert_eq!(
        statuses.last().unwrap()["message"],
        "Kubernetes master was succesfully setup."
    );
}

// ---------------------------------------------------------------------------
// kubicctl node add
// ---------------------------------------------------------------------------

#[test]
fn node_add_fans_out_to_listed_hosts() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .args(["node", "add", "worker1,worker2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Joined worker1,worker2"))
        .stderr(predicate::str::contains("salt -L worker1,worker2 service.start crio"))
        .stderr(predicate::str::contains(
            "salt -L worker1,worker2 grains.append kubicd kubic-worker-node",
        ));
}

#[test]
fn node_add_empty_target_fails_without_commands() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .args(["node", "add", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid target spec"))
        .stderr(predicate::str::contains("would run").not());
}

// ---------------------------------------------------------------------------
// kubicctl deploy / deployments
// ---------------------------------------------------------------------------

#[test]
fn deploy_records_digest_in_store() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("app.yaml");
    std::fs::write(&manifest, "kind: Deployment\n").unwrap();

    kubicctl(&dir)
        .arg("deploy")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployed"));

    let store = std::fs::read_to_string(dir.path().join("k8s-yaml.conf")).unwrap();
    let digest = kubic_core::deployment::manifest_digest(&manifest).unwrap();
    assert!(store.contains(&format!("{}={}", manifest.display(), digest)));
}

#[test]
fn deployments_reports_modified_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("app.yaml");
    std::fs::write(&manifest, "kind: Deployment\n").unwrap();
    kubicctl(&dir).arg("deploy").arg(&manifest).assert().success();

    std::fs::write(&manifest, "kind: Deployment\nspec: {}\n").unwrap();
    let output = kubicctl(&dir)
        .args(["--json", "deployments"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["status"], "modified");
}

#[test]
fn deployments_empty_store() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .arg("deployments")
        .assert()
        .success()
        .stdout(predicate::str::contains("No deployments recorded."));
}

// ---------------------------------------------------------------------------
// kubicctl reset
// ---------------------------------------------------------------------------

#[test]
fn reset_runs_teardown_in_order() {
    let dir = TempDir::new().unwrap();
    kubicctl(&dir)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Control plane reset."))
        .stderr(predicate::str::contains("3 command(s) would run"))
        .stderr(predicate::str::contains(
            "kubeadm reset --force --cri-socket=/run/crio/crio.sock",
        ));
}
