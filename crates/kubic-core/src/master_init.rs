//! Bootstrapping a bare host into a control-plane node.
//!
//! The workflow walks [`MasterInitStage`] strictly forward. Each stage is
//! announced to the status sink before its side effect runs, and a failure
//! runs the stage's compensation before the terminal failure is sent.

use crate::config::Config;
use crate::deployment::DeploymentTracker;
use crate::error::{KubicError, Result};
use crate::probe::{ControlPlaneState, HostProbe};
use crate::reboot::RebootIntegration;
use crate::reset;
use crate::runner::{CommandRunner, StepResult};
use crate::status::{StatusMessage, StatusSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

pub const ALREADY_INITIALIZED: &str = "Seems like a kubernetes control-plane is already running. If not, please use \"kubeadm reset\" to clean up the system.";
pub const MASTER_READY: &str = "Kubernetes master was succesfully setup.";

// ---------------------------------------------------------------------------
// PodNetwork
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodNetwork {
    #[default]
    Flannel,
    Cilium,
}

impl PodNetwork {
    /// Case-insensitive; an empty value selects flannel.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("flannel") {
            Ok(PodNetwork::Flannel)
        } else if raw.eq_ignore_ascii_case("cilium") {
            Ok(PodNetwork::Cilium)
        } else {
            Err(KubicError::UnsupportedPodNetwork(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodNetwork::Flannel => "flannel",
            PodNetwork::Cilium => "cilium",
        }
    }

    pub fn manifest<'c>(&self, config: &'c Config) -> &'c Path {
        match self {
            PodNetwork::Flannel => &config.flannel_manifest,
            PodNetwork::Cilium => &config.cilium_manifest,
        }
    }
}

impl fmt::Display for PodNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// InitRequest
// ---------------------------------------------------------------------------

/// Raw inbound request; validated during preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub pod_network: String,
    #[serde(default)]
    pub kubernetes_version: Option<String>,
}

impl InitRequest {
    fn explicit_version(&self) -> Option<&str> {
        self.kubernetes_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Stages and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterInitStage {
    Preflight,
    EnableRuntime,
    EnableKubelet,
    ClusterInit,
    DeployNetwork,
    DeployRebootDaemon,
    ConfigureRebootIntegration,
    Done,
}

const SIDE_EFFECT_STAGES: [MasterInitStage; 6] = [
    MasterInitStage::EnableRuntime,
    MasterInitStage::EnableKubelet,
    MasterInitStage::ClusterInit,
    MasterInitStage::DeployNetwork,
    MasterInitStage::DeployRebootDaemon,
    MasterInitStage::ConfigureRebootIntegration,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compensation {
    Nothing,
    DisableRuntime,
    ResetMaster,
}

impl MasterInitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasterInitStage::Preflight => "preflight",
            MasterInitStage::EnableRuntime => "enable_runtime",
            MasterInitStage::EnableKubelet => "enable_kubelet",
            MasterInitStage::ClusterInit => "cluster_init",
            MasterInitStage::DeployNetwork => "deploy_network",
            MasterInitStage::DeployRebootDaemon => "deploy_reboot_daemon",
            MasterInitStage::ConfigureRebootIntegration => "configure_reboot_integration",
            MasterInitStage::Done => "done",
        }
    }

    /// Undo required when this stage itself fails.
    fn on_failure(self) -> Compensation {
        match self {
            MasterInitStage::EnableKubelet => Compensation::DisableRuntime,
            MasterInitStage::ClusterInit
            | MasterInitStage::DeployNetwork
            | MasterInitStage::DeployRebootDaemon => Compensation::ResetMaster,
            _ => Compensation::Nothing,
        }
    }

    /// Undo required to leave the host clean once this stage has completed.
    fn after_completion(self) -> Compensation {
        match self {
            MasterInitStage::EnableRuntime => Compensation::DisableRuntime,
            MasterInitStage::EnableKubelet
            | MasterInitStage::ClusterInit
            | MasterInitStage::DeployNetwork
            | MasterInitStage::DeployRebootDaemon => Compensation::ResetMaster,
            _ => Compensation::Nothing,
        }
    }
}

impl fmt::Display for MasterInitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitOutcome {
    Completed,
    /// Refused during preflight; nothing was touched.
    Rejected,
    /// `rolled_back` is true only when a compensation ran and succeeded.
    Failed { rolled_back: bool },
    /// The status receiver went away; applied stages were compensated.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    /// Stage the workflow stopped in (or `Done`).
    pub stage: MasterInitStage,
    pub outcome: InitOutcome,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Forwards to the sink until the receiver disappears, then goes quiet.
struct Emitter<'s> {
    sink: &'s mut dyn StatusSink,
    detached: bool,
}

impl Emitter<'_> {
    fn emit(&mut self, status: StatusMessage) {
        if self.detached {
            return;
        }
        if self.sink.send(status).is_err() {
            warn!("status receiver disconnected; no further progress will be sent");
            self.detached = true;
        }
    }
}

// ---------------------------------------------------------------------------
// MasterInitWorkflow
// ---------------------------------------------------------------------------

pub struct MasterInitWorkflow<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a Config,
    probe: &'a dyn HostProbe,
}

impl<'a> MasterInitWorkflow<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a Config,
        probe: &'a dyn HostProbe,
    ) -> Self {
        Self {
            runner,
            config,
            probe,
        }
    }

    pub fn run(&self, request: &InitRequest, sink: &mut dyn StatusSink) -> InitReport {
        let mut out = Emitter {
            sink,
            detached: false,
        };

        if let ControlPlaneState::Present(marker) = self.probe.control_plane_state() {
            info!(marker = %marker.display(), "control plane already present");
            out.emit(StatusMessage::failure(ALREADY_INITIALIZED));
            return rejected();
        }
        let network = match PodNetwork::parse(&request.pod_network) {
            Ok(n) => n,
            Err(e) => {
                out.emit(StatusMessage::failure(e.to_string()));
                return rejected();
            }
        };
        info!(pod_network = %network, "initializing control plane");

        let mut completed = MasterInitStage::Preflight;
        for stage in SIDE_EFFECT_STAGES {
            out.emit(StatusMessage::progress(self.announcement(stage, network)));
            if out.detached {
                return self.cancel(completed);
            }

            debug!(%stage, "entering stage");
            if let Err(failed) = self.execute(stage, network, request, &mut out) {
                let rollback = self.compensate(stage.on_failure());
                out.emit(StatusMessage::failure(with_rollback(failed.message, &rollback)));
                return InitReport {
                    stage,
                    outcome: InitOutcome::Failed {
                        rolled_back: rollback.as_ref().is_some_and(|r| r.success),
                    },
                };
            }
            completed = stage;
        }

        out.emit(StatusMessage::progress(MASTER_READY));
        info!("control plane ready");
        InitReport {
            stage: MasterInitStage::Done,
            outcome: InitOutcome::Completed,
        }
    }

    fn announcement(&self, stage: MasterInitStage, network: PodNetwork) -> String {
        match stage {
            MasterInitStage::EnableRuntime => {
                format!("Enable and start {}", self.config.runtime_service)
            }
            MasterInitStage::EnableKubelet => {
                format!("Enable and start {}", self.config.kubelet_service)
            }
            MasterInitStage::ClusterInit => "Initialize Kubernetes control-plane".to_string(),
            MasterInitStage::DeployNetwork => format!("Deploy {network}"),
            MasterInitStage::DeployRebootDaemon => {
                "Deploy Kubernetes Reboot Daemon (kured)".to_string()
            }
            MasterInitStage::ConfigureRebootIntegration => format!(
                "Configure transactional-update to use {} for reboot",
                self.config.reboot.value
            ),
            MasterInitStage::Preflight | MasterInitStage::Done => stage.to_string(),
        }
    }

    fn execute(
        &self,
        stage: MasterInitStage,
        network: PodNetwork,
        request: &InitRequest,
        out: &mut Emitter<'_>,
    ) -> std::result::Result<(), StepResult> {
        let tracker = DeploymentTracker::new(self.runner, self.config);
        let result = match stage {
            MasterInitStage::EnableRuntime => self.enable_service(&self.config.runtime_service),
            MasterInitStage::EnableKubelet => self.enable_service(&self.config.kubelet_service),
            MasterInitStage::ClusterInit => {
                let args = self.cluster_init_args(network, request);
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.runner.run("kubeadm", &args)
            }
            MasterInitStage::DeployNetwork => tracker.deploy(network.manifest(self.config)),
            MasterInitStage::DeployRebootDaemon => tracker.deploy(&self.config.kured_manifest),
            MasterInitStage::ConfigureRebootIntegration => {
                let integration = RebootIntegration::new(&self.config.reboot);
                if let Err(e) = integration.configure() {
                    warn!(error = %e, "reboot integration failed; continuing");
                    out.emit(StatusMessage::progress(integration.manual_advice()));
                }
                StepResult::ok("")
            }
            MasterInitStage::Preflight | MasterInitStage::Done => StepResult::ok(""),
        };

        if result.success {
            Ok(())
        } else {
            warn!(%stage, message = %result.message, "stage failed");
            Err(result)
        }
    }

    fn enable_service(&self, service: &str) -> StepResult {
        self.runner.run("systemctl", &["enable", "--now", service])
    }

    /// `kubeadm init` arguments: CRI socket, the flannel pod CIDR, and the
    /// requested or installed Kubernetes version when one is known.
    pub fn cluster_init_args(&self, network: PodNetwork, request: &InitRequest) -> Vec<String> {
        let mut args = vec!["init".to_string(), self.config.cri_socket_arg()];
        if network == PodNetwork::Flannel {
            args.push(format!("--pod-network-cidr={}", self.config.flannel_pod_cidr));
        }
        let version = match request.explicit_version() {
            Some(v) => Some(v.to_string()),
            None => self.installed_version(),
        };
        if let Some(v) = version {
            args.push(format!("--kubernetes-version={v}"));
        }
        args
    }

    /// Version of the installed kubeadm package, if the package manager knows it.
    fn installed_version(&self) -> Option<String> {
        let result = self.runner.run(
            "rpm",
            &["-q", "--qf", "%{VERSION}", self.config.kubeadm_package.as_str()],
        );
        if !result.success {
            debug!(message = %result.message, "kubeadm package version unavailable");
            return None;
        }
        let version = result.message.replace('\'', "");
        let version = version.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    fn compensate(&self, compensation: Compensation) -> Option<StepResult> {
        let result = match compensation {
            Compensation::Nothing => return None,
            Compensation::DisableRuntime => reset::disable_runtime(self.runner, self.config),
            Compensation::ResetMaster => reset::reset_master(self.runner, self.config),
        };
        if !result.success {
            warn!(message = %result.message, "rollback incomplete");
        }
        Some(result)
    }

    fn cancel(&self, completed: MasterInitStage) -> InitReport {
        warn!(%completed, "cancelled by disconnect; compensating applied stages");
        self.compensate(completed.after_completion());
        InitReport {
            stage: completed,
            outcome: InitOutcome::Cancelled,
        }
    }
}

fn rejected() -> InitReport {
    InitReport {
        stage: MasterInitStage::Preflight,
        outcome: InitOutcome::Rejected,
    }
}

fn with_rollback(message: String, rollback: &Option<StepResult>) -> String {
    match rollback {
        Some(r) if !r.success => format!("{message}\nrollback: {}", r.message),
        _ => message,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
